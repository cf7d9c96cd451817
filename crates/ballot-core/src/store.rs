//! Storage traits for sessions and voter status.
//!
//! The traits are implemented by storage backends (e.g.
//! `ballot-store-sqlite`). The services in [`crate::session`] and
//! [`crate::voting`] depend on this abstraction, not on any concrete backend.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  session::{NewSession, Session},
  voting::{CastOutcome, VoterStatus},
};

/// Persistence of refresh-token sessions.
pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new active session.
  fn create_session(
    &self,
    session: NewSession,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Look up a session by refresh-token hash, whatever its state.
  fn session_by_hash<'a>(
    &'a self,
    token_hash: &'a str,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + 'a;

  /// Revoke `old` and create `successor` as one unit of work.
  ///
  /// The revocation only applies while `old` is still active at `now`. If it
  /// is not (already rotated, revoked or expired) nothing is written and
  /// `None` is returned, so one rotation can never produce two live
  /// sessions.
  fn rotate_session(
    &self,
    old: Uuid,
    successor: NewSession,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  /// Revoke one session. Returns `false` if it was already revoked or does
  /// not exist.
  fn revoke_session(
    &self,
    session_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Revoke every unrevoked session of a principal. Returns how many were
  /// revoked.
  fn revoke_all_sessions(
    &self,
    principal_id: i64,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

/// Persistence of per-election voter status rows.
pub trait VoterStatusStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create an eligible, not-yet-voted row. An existing row is returned
  /// unchanged.
  fn register_voter(
    &self,
    election_id: i64,
    voter_id: i64,
  ) -> impl Future<Output = Result<VoterStatus, Self::Error>> + Send + '_;

  /// Read a row without locking it.
  fn voter_status(
    &self,
    election_id: i64,
    voter_id: i64,
  ) -> impl Future<Output = Result<Option<VoterStatus>, Self::Error>> + Send + '_;

  /// Locked read-modify-write of one `(election_id, voter_id)` row.
  ///
  /// Takes an exclusive lock covering the row, reads it (`None` if absent)
  /// and passes it to `decide`. If `decide` returns an outcome, the new
  /// status and the optional ballot are written and committed together and
  /// the new status is returned. If it returns an error, nothing is written
  /// and the error is passed through in the inner `Result`. The outer
  /// `Result` carries storage failures only.
  fn cast_locked<F>(
    &self,
    election_id: i64,
    voter_id: i64,
    decide: F,
  ) -> impl Future<Output = Result<crate::Result<VoterStatus>, Self::Error>> + Send + '_
  where
    F: FnOnce(Option<VoterStatus>) -> crate::Result<CastOutcome> + Send + 'static;
}
