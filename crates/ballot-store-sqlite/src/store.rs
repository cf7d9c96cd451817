//! [`SqliteStore`]: the SQLite implementation of the core storage traits.

use std::path::Path;

use ballot_core::{
  election::{Election, ElectionCatalog},
  principal::{Directory, NewPrincipal, Principal, Role},
  session::{NewSession, Session},
  store::{SessionStore, VoterStatusStore},
  voting::{CastOutcome, VoterStatus},
};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawElection, RawPrincipal, RawSession, RawVoterStatus, decode_dt, encode_dt, encode_phases,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A ballot store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every call
/// runs on the connection's own thread, and the multi-statement units
/// (vote cast, session rotation) run inside `BEGIN IMMEDIATE` transactions,
/// which take the database write lock before the first read.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Directory administration ──────────────────────────────────────────────

  /// Insert a new active principal.
  pub async fn create_principal(&self, input: NewPrincipal) -> Result<Principal> {
    let created_at = Utc::now();
    let at_str = encode_dt(created_at);
    let role_str = input.role.as_str();
    let username = input.username.clone();
    let password_hash = input.password_hash.clone();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO principals (username, password_hash, role, is_active, voter_id, tps_id, created_at)
           VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6)",
          rusqlite::params![
            username,
            password_hash,
            role_str,
            input.voter_id,
            input.tps_id,
            at_str,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Principal {
      id,
      username: input.username,
      password_hash: input.password_hash,
      role: input.role,
      is_active: true,
      voter_id: input.voter_id,
      tps_id: input.tps_id,
      created_at,
    })
  }

  /// Activate or deactivate a principal.
  pub async fn set_active(&self, principal_id: i64, active: bool) -> Result<()> {
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE principals SET is_active = ?1 WHERE principal_id = ?2",
          rusqlite::params![active, principal_id],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::PrincipalNotFound(principal_id));
    }
    Ok(())
  }

  /// Administrative role change.
  pub async fn set_role(&self, principal_id: i64, role: Role) -> Result<()> {
    let role_str = role.as_str();
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE principals SET role = ?1 WHERE principal_id = ?2",
          rusqlite::params![role_str, principal_id],
        )?)
      })
      .await?;
    if changed == 0 {
      return Err(Error::PrincipalNotFound(principal_id));
    }
    Ok(())
  }

  // ── Election administration ───────────────────────────────────────────────

  /// Insert or update an election, including its full phase schedule.
  pub async fn put_election(&self, election: &Election) -> Result<()> {
    let id = election.id;
    let name = election.name.clone();
    let status = election.status.as_str();
    let online = election.online_enabled;
    let tps = election.tps_enabled;
    let phases = encode_phases(&election.phases);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO elections (
             election_id, name, status, online_enabled, tps_enabled,
             registration_start, registration_end,
             verification_start, verification_end,
             campaign_start, campaign_end,
             quiet_period_start, quiet_period_end,
             voting_start, voting_end,
             recap_start, recap_end
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
           ON CONFLICT (election_id) DO UPDATE SET
             name               = excluded.name,
             status             = excluded.status,
             online_enabled     = excluded.online_enabled,
             tps_enabled        = excluded.tps_enabled,
             registration_start = excluded.registration_start,
             registration_end   = excluded.registration_end,
             verification_start = excluded.verification_start,
             verification_end   = excluded.verification_end,
             campaign_start     = excluded.campaign_start,
             campaign_end       = excluded.campaign_end,
             quiet_period_start = excluded.quiet_period_start,
             quiet_period_end   = excluded.quiet_period_end,
             voting_start       = excluded.voting_start,
             voting_end         = excluded.voting_end,
             recap_start        = excluded.recap_start,
             recap_end          = excluded.recap_end",
          rusqlite::params![
            id, name, status, online, tps, phases[0], phases[1], phases[2], phases[3],
            phases[4], phases[5], phases[6], phases[7], phases[8], phases[9], phases[10],
            phases[11],
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of ballots recorded for a candidate.
  pub async fn count_ballots(&self, election_id: i64, candidate_id: i64) -> Result<i64> {
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.query_row(
            "SELECT COUNT(*) FROM ballots WHERE election_id = ?1 AND candidate_id = ?2",
            rusqlite::params![election_id, candidate_id],
            |r| r.get(0),
          )?)
        })
        .await?,
    )
  }
}

// ─── Directory impl ──────────────────────────────────────────────────────────

impl Directory for SqliteStore {
  type Error = Error;

  async fn principal_by_username(&self, username: &str) -> Result<Option<Principal>> {
    let username = username.to_owned();
    let raw: Option<RawPrincipal> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM principals WHERE username = ?1", RawPrincipal::COLUMNS),
            rusqlite::params![username],
            RawPrincipal::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPrincipal::into_principal).transpose()
  }

  async fn principal_by_id(&self, id: i64) -> Result<Option<Principal>> {
    let raw: Option<RawPrincipal> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM principals WHERE principal_id = ?1", RawPrincipal::COLUMNS),
            rusqlite::params![id],
            RawPrincipal::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPrincipal::into_principal).transpose()
  }
}

// ─── ElectionCatalog impl ────────────────────────────────────────────────────

impl ElectionCatalog for SqliteStore {
  type Error = Error;

  async fn election(&self, id: i64) -> Result<Option<Election>> {
    let raw: Option<RawElection> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM elections WHERE election_id = ?1", RawElection::COLUMNS),
            rusqlite::params![id],
            RawElection::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawElection::into_election).transpose()
  }
}

// ─── SessionStore impl ───────────────────────────────────────────────────────

fn session_record(input: NewSession, now: DateTime<Utc>) -> Session {
  Session {
    session_id:   Uuid::new_v4(),
    principal_id: input.principal_id,
    token_hash:   input.token_hash,
    user_agent:   input.user_agent,
    ip_address:   input.ip_address,
    created_at:   now,
    expires_at:   input.expires_at,
    revoked_at:   None,
  }
}

fn insert_session(conn: &rusqlite::Connection, session: &Session) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO sessions (
       session_id, principal_id, token_hash, user_agent, ip_address,
       created_at, expires_at, revoked_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
    rusqlite::params![
      encode_uuid(session.session_id),
      session.principal_id,
      session.token_hash,
      session.user_agent,
      session.ip_address,
      encode_dt(session.created_at),
      encode_dt(session.expires_at),
    ],
  )?;
  Ok(())
}

impl SessionStore for SqliteStore {
  type Error = Error;

  async fn create_session(&self, input: NewSession) -> Result<Session> {
    let session = session_record(input, Utc::now());
    let record = session.clone();

    self
      .conn
      .call(move |conn| {
        insert_session(conn, &record)?;
        Ok(())
      })
      .await?;

    Ok(session)
  }

  async fn session_by_hash(&self, token_hash: &str) -> Result<Option<Session>> {
    let token_hash = token_hash.to_owned();
    let raw: Option<RawSession> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM sessions WHERE token_hash = ?1", RawSession::COLUMNS),
            rusqlite::params![token_hash],
            RawSession::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSession::into_session).transpose()
  }

  async fn rotate_session(
    &self,
    old: Uuid,
    successor: NewSession,
    now: DateTime<Utc>,
  ) -> Result<Option<Session>> {
    let session = session_record(successor, now);
    let record = session.clone();
    let old_str = encode_uuid(old);
    let now_str = encode_dt(now);

    let rotated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(Option<String>, String)> = tx
          .query_row(
            "SELECT revoked_at, expires_at FROM sessions WHERE session_id = ?1",
            rusqlite::params![old_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;

        let Some((None, expires_at)) = row else {
          return Ok(false);
        };
        let expires_at = decode_dt(&expires_at).map_err(Error::into_call_error)?;
        if now >= expires_at {
          return Ok(false);
        }

        tx.execute(
          "UPDATE sessions SET revoked_at = ?1 WHERE session_id = ?2 AND revoked_at IS NULL",
          rusqlite::params![now_str, old_str],
        )?;
        insert_session(&tx, &record)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    debug!(old = %old, rotated, "session rotation");
    Ok(rotated.then_some(session))
  }

  async fn revoke_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    let id_str = encode_uuid(session_id);
    let now_str = encode_dt(now);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE sessions SET revoked_at = ?1 WHERE session_id = ?2 AND revoked_at IS NULL",
          rusqlite::params![now_str, id_str],
        )?)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn revoke_all_sessions(&self, principal_id: i64, now: DateTime<Utc>) -> Result<usize> {
    let now_str = encode_dt(now);

    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.execute(
            "UPDATE sessions SET revoked_at = ?1 WHERE principal_id = ?2 AND revoked_at IS NULL",
            rusqlite::params![now_str, principal_id],
          )?)
        })
        .await?,
    )
  }
}

// ─── VoterStatusStore impl ───────────────────────────────────────────────────

fn select_status(
  conn: &rusqlite::Connection,
  election_id: i64,
  voter_id: i64,
) -> rusqlite::Result<Option<RawVoterStatus>> {
  conn
    .query_row(
      &format!(
        "SELECT {} FROM voter_status WHERE election_id = ?1 AND voter_id = ?2",
        RawVoterStatus::COLUMNS
      ),
      rusqlite::params![election_id, voter_id],
      RawVoterStatus::from_row,
    )
    .optional()
}

impl VoterStatusStore for SqliteStore {
  type Error = Error;

  async fn register_voter(&self, election_id: i64, voter_id: i64) -> Result<VoterStatus> {
    let now_str = encode_dt(Utc::now());

    let raw: Option<RawVoterStatus> = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO voter_status (election_id, voter_id, is_eligible, has_voted, created_at, updated_at)
           VALUES (?1, ?2, 1, 0, ?3, ?3)
           ON CONFLICT (election_id, voter_id) DO NOTHING",
          rusqlite::params![election_id, voter_id, now_str],
        )?;
        Ok(select_status(conn, election_id, voter_id)?)
      })
      .await?;

    raw
      .map(RawVoterStatus::into_status)
      .transpose()?
      .ok_or(Error::ElectionNotFound(election_id))
  }

  async fn voter_status(&self, election_id: i64, voter_id: i64) -> Result<Option<VoterStatus>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_status(conn, election_id, voter_id)?))
      .await?;

    raw.map(RawVoterStatus::into_status).transpose()
  }

  async fn cast_locked<F>(
    &self,
    election_id: i64,
    voter_id: i64,
    decide: F,
  ) -> Result<ballot_core::Result<VoterStatus>>
  where
    F: FnOnce(Option<VoterStatus>) -> ballot_core::Result<CastOutcome> + Send + 'static,
  {
    let decision = self
      .conn
      .call(move |conn| {
        // Write lock first: a concurrent cast for the same row waits here
        // until this transaction commits or rolls back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = select_status(&tx, election_id, voter_id)?
          .map(RawVoterStatus::into_status)
          .transpose()
          .map_err(Error::into_call_error)?;

        // Dropping `tx` on rejection rolls back.
        let CastOutcome { status, ballot } = match decide(current) {
          Ok(outcome) => outcome,
          Err(rejection) => return Ok(Err(rejection)),
        };

        tx.execute(
          "UPDATE voter_status
              SET has_voted       = ?1,
                  voting_method   = ?2,
                  tps_id          = ?3,
                  voted_at        = ?4,
                  vote_token_hash = ?5,
                  updated_at      = ?6
            WHERE election_id = ?7 AND voter_id = ?8",
          rusqlite::params![
            status.has_voted,
            status.voting_method.map(|m| m.as_str()),
            status.tps_id,
            status.voted_at.map(encode_dt),
            status.vote_token_hash,
            encode_dt(Utc::now()),
            election_id,
            voter_id,
          ],
        )?;

        if let Some(ballot) = ballot {
          tx.execute(
            "INSERT INTO ballots (election_id, candidate_id, voting_method, tps_id, vote_token_hash, cast_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
              ballot.election_id,
              ballot.candidate_id,
              ballot.method.as_str(),
              ballot.tps_id,
              ballot.vote_token_hash,
              encode_dt(ballot.cast_at),
            ],
          )?;
        }

        tx.commit()?;
        Ok(Ok(status))
      })
      .await?;

    debug!(election_id, voter_id, accepted = decision.is_ok(), "cast transaction finished");
    Ok(decision)
  }
}
