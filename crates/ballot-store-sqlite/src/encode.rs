//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings in UTC with a fixed nanosecond
//! width, so they round-trip exactly and sort lexicographically. UUIDs are
//! stored as hyphenated lowercase strings.

use ballot_core::{
  election::{Election, ElectionStatus},
  phase::{PhaseSchedule, PhaseWindow},
  principal::{Principal, Role},
  session::Session,
  voting::{VoterStatus, VotingMethod},
};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

pub fn decode_role(s: &str) -> Result<Role> {
  Role::parse(s).ok_or_else(|| Error::UnknownValue {
    column: "role",
    value:  s.to_string(),
  })
}

pub fn decode_method(s: &str) -> Result<VotingMethod> {
  VotingMethod::parse(s).ok_or_else(|| Error::UnknownValue {
    column: "voting_method",
    value:  s.to_string(),
  })
}

pub fn decode_status(s: &str) -> Result<ElectionStatus> {
  ElectionStatus::parse(s).ok_or_else(|| Error::UnknownValue {
    column: "status",
    value:  s.to_string(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `principals` row.
pub struct RawPrincipal {
  pub principal_id:  i64,
  pub username:      String,
  pub password_hash: String,
  pub role:          String,
  pub is_active:     bool,
  pub voter_id:      Option<i64>,
  pub tps_id:        Option<i64>,
  pub created_at:    String,
}

impl RawPrincipal {
  pub const COLUMNS: &'static str =
    "principal_id, username, password_hash, role, is_active, voter_id, tps_id, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      principal_id:  row.get(0)?,
      username:      row.get(1)?,
      password_hash: row.get(2)?,
      role:          row.get(3)?,
      is_active:     row.get(4)?,
      voter_id:      row.get(5)?,
      tps_id:        row.get(6)?,
      created_at:    row.get(7)?,
    })
  }

  pub fn into_principal(self) -> Result<Principal> {
    Ok(Principal {
      id:            self.principal_id,
      username:      self.username,
      password_hash: self.password_hash,
      role:          decode_role(&self.role)?,
      is_active:     self.is_active,
      voter_id:      self.voter_id,
      tps_id:        self.tps_id,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `sessions` row.
pub struct RawSession {
  pub session_id:   String,
  pub principal_id: i64,
  pub token_hash:   String,
  pub user_agent:   Option<String>,
  pub ip_address:   Option<String>,
  pub created_at:   String,
  pub expires_at:   String,
  pub revoked_at:   Option<String>,
}

impl RawSession {
  pub const COLUMNS: &'static str = "session_id, principal_id, token_hash, user_agent, \
                                     ip_address, created_at, expires_at, revoked_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:   row.get(0)?,
      principal_id: row.get(1)?,
      token_hash:   row.get(2)?,
      user_agent:   row.get(3)?,
      ip_address:   row.get(4)?,
      created_at:   row.get(5)?,
      expires_at:   row.get(6)?,
      revoked_at:   row.get(7)?,
    })
  }

  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      session_id:   decode_uuid(&self.session_id)?,
      principal_id: self.principal_id,
      token_hash:   self.token_hash,
      user_agent:   self.user_agent,
      ip_address:   self.ip_address,
      created_at:   decode_dt(&self.created_at)?,
      expires_at:   decode_dt(&self.expires_at)?,
      revoked_at:   decode_opt_dt(self.revoked_at)?,
    })
  }
}

/// Raw values read directly from a `voter_status` row.
pub struct RawVoterStatus {
  pub election_id:     i64,
  pub voter_id:        i64,
  pub is_eligible:     bool,
  pub has_voted:       bool,
  pub voting_method:   Option<String>,
  pub tps_id:          Option<i64>,
  pub voted_at:        Option<String>,
  pub vote_token_hash: Option<String>,
}

impl RawVoterStatus {
  pub const COLUMNS: &'static str = "election_id, voter_id, is_eligible, has_voted, \
                                     voting_method, tps_id, voted_at, vote_token_hash";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      election_id:     row.get(0)?,
      voter_id:        row.get(1)?,
      is_eligible:     row.get(2)?,
      has_voted:       row.get(3)?,
      voting_method:   row.get(4)?,
      tps_id:          row.get(5)?,
      voted_at:        row.get(6)?,
      vote_token_hash: row.get(7)?,
    })
  }

  pub fn into_status(self) -> Result<VoterStatus> {
    Ok(VoterStatus {
      election_id:     self.election_id,
      voter_id:        self.voter_id,
      is_eligible:     self.is_eligible,
      has_voted:       self.has_voted,
      voting_method:   self.voting_method.as_deref().map(decode_method).transpose()?,
      tps_id:          self.tps_id,
      voted_at:        decode_opt_dt(self.voted_at)?,
      vote_token_hash: self.vote_token_hash,
    })
  }
}

/// Raw values read directly from an `elections` row. The twelve phase
/// columns are kept in canonical order.
pub struct RawElection {
  pub election_id:    i64,
  pub name:           String,
  pub status:         String,
  pub online_enabled: bool,
  pub tps_enabled:    bool,
  pub phases:         [String; 12],
}

impl RawElection {
  pub const COLUMNS: &'static str = "election_id, name, status, online_enabled, tps_enabled, \
                                     registration_start, registration_end, \
                                     verification_start, verification_end, \
                                     campaign_start, campaign_end, \
                                     quiet_period_start, quiet_period_end, \
                                     voting_start, voting_end, \
                                     recap_start, recap_end";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let mut phases: [String; 12] = Default::default();
    for (i, slot) in phases.iter_mut().enumerate() {
      *slot = row.get(5 + i)?;
    }
    Ok(Self {
      election_id: row.get(0)?,
      name: row.get(1)?,
      status: row.get(2)?,
      online_enabled: row.get(3)?,
      tps_enabled: row.get(4)?,
      phases,
    })
  }

  pub fn into_election(self) -> Result<Election> {
    let window = |i: usize| -> Result<PhaseWindow> {
      Ok(PhaseWindow::new(
        decode_dt(&self.phases[2 * i])?,
        decode_dt(&self.phases[2 * i + 1])?,
      ))
    };
    let phases = PhaseSchedule {
      registration: window(0)?,
      verification: window(1)?,
      campaign:     window(2)?,
      quiet_period: window(3)?,
      voting:       window(4)?,
      recap:        window(5)?,
    };
    Ok(Election {
      id: self.election_id,
      name: self.name,
      status: decode_status(&self.status)?,
      online_enabled: self.online_enabled,
      tps_enabled: self.tps_enabled,
      phases,
    })
  }
}

/// The twelve phase columns of an election, in [`RawElection`] order.
pub fn encode_phases(schedule: &PhaseSchedule) -> Vec<String> {
  schedule
    .iter()
    .flat_map(|(_, w)| [encode_dt(w.start), encode_dt(w.end)])
    .collect()
}
