//! Election phase windows and the schedule validator.
//!
//! An election runs through six phases in a fixed order. Each phase is a
//! half-open interval `[start, end)`. Adjacent phases may touch (the earlier
//! one ends at the instant the later one starts) or leave a gap, and several
//! phases may share a calendar day, but no two phases may overlap.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Keys ────────────────────────────────────────────────────────────────────

/// The six phases, declared in canonical order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKey {
  Registration,
  Verification,
  Campaign,
  QuietPeriod,
  Voting,
  Recap,
}

impl PhaseKey {
  pub const ALL: [PhaseKey; 6] = [
    PhaseKey::Registration,
    PhaseKey::Verification,
    PhaseKey::Campaign,
    PhaseKey::QuietPeriod,
    PhaseKey::Voting,
    PhaseKey::Recap,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      PhaseKey::Registration => "registration",
      PhaseKey::Verification => "verification",
      PhaseKey::Campaign => "campaign",
      PhaseKey::QuietPeriod => "quiet_period",
      PhaseKey::Voting => "voting",
      PhaseKey::Recap => "recap",
    }
  }
}

impl fmt::Display for PhaseKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Windows ─────────────────────────────────────────────────────────────────

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseWindow {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl PhaseWindow {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self { Self { start, end } }

  pub fn contains(&self, at: DateTime<Utc>) -> bool { self.start <= at && at < self.end }
}

/// The full schedule of an election. Having one named field per phase makes
/// a missing or duplicated phase unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSchedule {
  pub registration: PhaseWindow,
  pub verification: PhaseWindow,
  pub campaign:     PhaseWindow,
  pub quiet_period: PhaseWindow,
  pub voting:       PhaseWindow,
  pub recap:        PhaseWindow,
}

impl PhaseSchedule {
  pub fn window(&self, key: PhaseKey) -> &PhaseWindow {
    match key {
      PhaseKey::Registration => &self.registration,
      PhaseKey::Verification => &self.verification,
      PhaseKey::Campaign => &self.campaign,
      PhaseKey::QuietPeriod => &self.quiet_period,
      PhaseKey::Voting => &self.voting,
      PhaseKey::Recap => &self.recap,
    }
  }

  /// Phases paired with their windows, in canonical order.
  pub fn iter(&self) -> impl Iterator<Item = (PhaseKey, &PhaseWindow)> + '_ {
    PhaseKey::ALL.into_iter().map(|key| (key, self.window(key)))
  }

  /// The phase whose window contains `at`, if any. Only meaningful for a
  /// schedule that passed [`validate_phases`].
  pub fn current_phase(&self, at: DateTime<Utc>) -> Option<PhaseKey> {
    self.iter().find(|(_, w)| w.contains(at)).map(|(key, _)| key)
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// A single problem found in a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "conflict", rename_all = "snake_case")]
pub enum PhaseConflict {
  /// `start >= end`.
  EmptyWindow { phase: PhaseKey },
  /// `earlier.end > later.start`.
  Overlap { earlier: PhaseKey, later: PhaseKey },
}

impl fmt::Display for PhaseConflict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PhaseConflict::EmptyWindow { phase } => {
        write!(f, "{phase} must start before it ends")
      }
      PhaseConflict::Overlap { earlier, later } => {
        write!(f, "{earlier} overlaps {later}")
      }
    }
  }
}

/// Every conflict found in a schedule, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid phase schedule: {}", join_conflicts(.conflicts))]
pub struct PhaseOrderError {
  pub conflicts: Vec<PhaseConflict>,
}

fn join_conflicts(conflicts: &[PhaseConflict]) -> String {
  conflicts
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

/// Check that every phase is non-empty and that adjacent phases do not
/// overlap. All conflicts are collected rather than stopping at the first.
pub fn validate_phases(schedule: &PhaseSchedule) -> Result<(), PhaseOrderError> {
  let mut conflicts = Vec::new();

  for (phase, window) in schedule.iter() {
    if window.start >= window.end {
      conflicts.push(PhaseConflict::EmptyWindow { phase });
    }
  }

  for pair in PhaseKey::ALL.windows(2) {
    let (earlier, later) = (pair[0], pair[1]);
    if schedule.window(earlier).end > schedule.window(later).start {
      conflicts.push(PhaseConflict::Overlap { earlier, later });
    }
  }

  if conflicts.is_empty() {
    Ok(())
  } else {
    Err(PhaseOrderError { conflicts })
  }
}
