//! Core types and trait definitions for the ballot integrity core.
//!
//! This crate has no HTTP or database dependencies. It owns the session
//! manager, the vote-cast rules, the ballot QR codec and the
//! phase schedule validator; storage backends (e.g. `ballot-store-sqlite`)
//! implement the traits in [`store`], [`principal`] and [`election`].

pub mod election;
pub mod error;
pub mod password;
pub mod phase;
pub mod principal;
pub mod qr;
pub mod session;
pub mod store;
pub mod token;
pub mod voting;

pub use error::{Error, ErrorKind, Result};
