//! Election metadata as seen by the voting core.
//!
//! Elections are created and edited by an administrative collaborator. The
//! core only reads them, apart from the activation gate, which refuses to
//! leave `Draft` while the phase schedule is inconsistent.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  phase::{PhaseSchedule, validate_phases},
  voting::VotingMethod,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElectionStatus {
  Draft,
  Published,
  VotingOpen,
  VotingClosed,
  Archived,
}

impl ElectionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      ElectionStatus::Draft => "DRAFT",
      ElectionStatus::Published => "PUBLISHED",
      ElectionStatus::VotingOpen => "VOTING_OPEN",
      ElectionStatus::VotingClosed => "VOTING_CLOSED",
      ElectionStatus::Archived => "ARCHIVED",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "DRAFT" => Some(ElectionStatus::Draft),
      "PUBLISHED" => Some(ElectionStatus::Published),
      "VOTING_OPEN" => Some(ElectionStatus::VotingOpen),
      "VOTING_CLOSED" => Some(ElectionStatus::VotingClosed),
      "ARCHIVED" => Some(ElectionStatus::Archived),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Election {
  pub id:             i64,
  pub name:           String,
  pub status:         ElectionStatus,
  pub online_enabled: bool,
  pub tps_enabled:    bool,
  pub phases:         PhaseSchedule,
}

impl Election {
  /// Whether the voting window contains `at`.
  pub fn is_voting_open(&self, at: DateTime<Utc>) -> bool {
    self.phases.voting.contains(at)
  }

  /// Whether the election's channel flags permit `method`.
  pub fn allows(&self, method: VotingMethod) -> bool {
    match method {
      VotingMethod::Online => self.online_enabled,
      VotingMethod::Tps => self.tps_enabled,
    }
  }

  /// Move a draft election to `Published` once its schedule validates.
  /// Elections that already left `Draft` are left untouched.
  pub fn activate(&mut self) -> Result<()> {
    validate_phases(&self.phases)?;
    if self.status == ElectionStatus::Draft {
      self.status = ElectionStatus::Published;
    }
    Ok(())
  }
}

/// Read-only source of election metadata.
pub trait ElectionCatalog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Retrieve an election by id. Returns `None` if not found.
  fn election(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Election>, Self::Error>> + Send + '_;
}

/// Load an election or fail with [`Error::ElectionNotFound`].
pub async fn require_election<C: ElectionCatalog>(catalog: &C, id: i64) -> Result<Election> {
  catalog
    .election(id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::ElectionNotFound(id))
}

#[cfg(test)]
pub(crate) mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;
  use crate::phase::{PhaseKey, tests::daily_schedule};

  pub(crate) fn election_voting_on(day: DateTime<Utc>) -> Election {
    // Voting is the fifth phase of the daily schedule.
    Election {
      id:             1,
      name:           "Student council 2025".to_string(),
      status:         ElectionStatus::VotingOpen,
      online_enabled: true,
      tps_enabled:    true,
      phases:         daily_schedule(day - Duration::days(4)),
    }
  }

  #[test]
  fn voting_open_follows_the_window() {
    let day = Utc.with_ymd_and_hms(2025, 2, 14, 0, 0, 0).unwrap();
    let election = election_voting_on(day);
    assert!(election.is_voting_open(day));
    assert!(election.is_voting_open(day + Duration::hours(23)));
    assert!(!election.is_voting_open(day + Duration::days(1)));
    assert!(!election.is_voting_open(day - Duration::seconds(1)));
  }

  #[test]
  fn activation_requires_a_valid_schedule() {
    let day = Utc.with_ymd_and_hms(2025, 2, 14, 0, 0, 0).unwrap();
    let mut election = election_voting_on(day);
    election.status = ElectionStatus::Draft;
    election.phases.voting.start -= Duration::hours(1);

    let err = election.activate().unwrap_err();
    let Error::PhaseOrder(err) = err else {
      panic!("expected phase order error, got {err:?}")
    };
    assert_eq!(err.conflicts.len(), 1);
    assert_eq!(election.status, ElectionStatus::Draft);

    election.phases.voting.start += Duration::hours(1);
    election.activate().unwrap();
    assert_eq!(election.status, ElectionStatus::Published);
    assert_eq!(election.phases.current_phase(day), Some(PhaseKey::Voting));
  }

  #[test]
  fn channel_flags_gate_methods() {
    let day = Utc.with_ymd_and_hms(2025, 2, 14, 0, 0, 0).unwrap();
    let mut election = election_voting_on(day);
    election.tps_enabled = false;
    assert!(election.allows(VotingMethod::Online));
    assert!(!election.allows(VotingMethod::Tps));
  }

  #[test]
  fn status_strings_round_trip() {
    for status in [
      ElectionStatus::Draft,
      ElectionStatus::Published,
      ElectionStatus::VotingOpen,
      ElectionStatus::VotingClosed,
      ElectionStatus::Archived,
    ] {
      assert_eq!(ElectionStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(ElectionStatus::parse("OPEN"), None);
  }
}
