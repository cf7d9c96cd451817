//! Error type for `ballot-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value outside its enumeration.
  #[error("unknown {column} value: {value:?}")]
  UnknownValue { column: &'static str, value: String },

  #[error("principal not found: {0}")]
  PrincipalNotFound(i64),

  #[error("election not found: {0}")]
  ElectionNotFound(i64),
}

impl Error {
  /// Carry a decoding failure out of a `Connection::call` closure.
  pub(crate) fn into_call_error(self) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(self))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
