//! SQLite backend for the ballot integrity core.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Implements every storage trait of
//! `ballot-core`: the directory, the election catalogue, sessions and voter
//! status.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
