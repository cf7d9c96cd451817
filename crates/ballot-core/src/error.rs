//! Error types for `ballot-core`.
//!
//! Every failure that leaves the core is one of the variants below. Callers
//! map them to user-facing responses through [`Error::kind`]; nothing is
//! logged and dropped on the way out.

use thiserror::Error;

use crate::phase::PhaseOrderError;

#[derive(Debug, Error)]
pub enum Error {
  // ── Authentication ────────────────────────────────────────────────────
  /// Unknown username or wrong password. The two are indistinguishable.
  #[error("invalid username or password")]
  InvalidCredentials,

  #[error("user account is inactive")]
  InactiveAccount,

  /// Unknown, revoked, rotated or expired refresh token.
  #[error("invalid or expired refresh token")]
  InvalidOrExpiredToken,

  #[error("access token has expired")]
  ExpiredToken,

  #[error("invalid access token")]
  InvalidToken,

  #[error("access denied")]
  Forbidden,

  // ── Business state ────────────────────────────────────────────────────
  #[error("voter is not eligible for this election")]
  VoterNotEligible,

  #[error("voter has already voted in this election")]
  AlreadyVoted,

  #[error("voting is not open for this election")]
  VotingNotOpen,

  #[error("voting method is not allowed for this election")]
  MethodNotAllowed,

  #[error("invalid ballot QR payload")]
  InvalidBallotQr,

  #[error(transparent)]
  PhaseOrder(#[from] PhaseOrderError),

  #[error("election not found: {0}")]
  ElectionNotFound(i64),

  // ── Infrastructure ────────────────────────────────────────────────────
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("password hashing failed: {0}")]
  PasswordHash(String),

  #[error("token issuance failed: {0}")]
  TokenIssue(String),
}

/// Coarse classification used by calling layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Rejected caller identity. Carries no detail.
  Authentication,
  /// Deterministic business outcome; retrying will not change it.
  Business,
  /// Storage or crypto failure; may be retried by the caller with backoff.
  Infrastructure,
}

impl Error {
  /// Wrap a backend error as an infrastructure failure.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidCredentials
      | Self::InactiveAccount
      | Self::InvalidOrExpiredToken
      | Self::ExpiredToken
      | Self::InvalidToken
      | Self::Forbidden => ErrorKind::Authentication,
      Self::VoterNotEligible
      | Self::AlreadyVoted
      | Self::VotingNotOpen
      | Self::MethodNotAllowed
      | Self::InvalidBallotQr
      | Self::PhaseOrder(_)
      | Self::ElectionNotFound(_) => ErrorKind::Business,
      Self::Store(_) | Self::PasswordHash(_) | Self::TokenIssue(_) => {
        ErrorKind::Infrastructure
      }
    }
  }

  pub fn is_retriable(&self) -> bool { self.kind() == ErrorKind::Infrastructure }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn vote_rejections_are_business_and_final() {
    for err in [
      Error::VoterNotEligible,
      Error::AlreadyVoted,
      Error::VotingNotOpen,
      Error::MethodNotAllowed,
    ] {
      assert_eq!(err.kind(), ErrorKind::Business);
      assert!(!err.is_retriable());
    }
  }

  #[test]
  fn store_errors_are_retriable() {
    let err = Error::store(std::io::Error::other("disk gone"));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(err.is_retriable());
  }

  #[test]
  fn credential_failures_share_a_message() {
    assert_eq!(
      Error::InvalidCredentials.to_string(),
      "invalid username or password"
    );
    assert_eq!(Error::InactiveAccount.kind(), ErrorKind::Authentication);
  }
}
