//! The vote-cast transaction.
//!
//! [`authorize_cast`] holds the rules; it is a pure function of the locked
//! voter status row, the election and the clock. [`VoteService`] loads the
//! election, then hands the rules to the store's
//! [`cast_locked`](crate::store::VoterStatusStore::cast_locked), which runs
//! them while holding an exclusive lock on the `(election, voter)` row and
//! commits the returned outcome atomically.
//!
//! Two concurrent casts for the same voter therefore serialise: the second
//! sees `has_voted = true` and fails with [`Error::AlreadyVoted`].

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tracing::{info, warn};

use crate::{
  Error, Result,
  election::{Election, ElectionCatalog, require_election},
  principal::Role,
  qr,
  store::VoterStatusStore,
  token::Claims,
};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotingMethod {
  Online,
  Tps,
}

impl VotingMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      VotingMethod::Online => "online",
      VotingMethod::Tps => "tps",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "online" => Some(VotingMethod::Online),
      "tps" => Some(VotingMethod::Tps),
      _ => None,
    }
  }
}

/// Where a vote comes from. A polling-station vote always names its station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum VoteChannel {
  Online,
  Tps { tps_id: i64 },
}

impl VoteChannel {
  pub fn method(self) -> VotingMethod {
    match self {
      VoteChannel::Online => VotingMethod::Online,
      VoteChannel::Tps { .. } => VotingMethod::Tps,
    }
  }

  pub fn tps_id(self) -> Option<i64> {
    match self {
      VoteChannel::Online => None,
      VoteChannel::Tps { tps_id } => Some(tps_id),
    }
  }
}

/// A request to cast one vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastVote {
  pub election_id:  i64,
  pub voter_id:     i64,
  pub candidate_id: Option<i64>,
  pub channel:      VoteChannel,
}

/// Per-election participation record of one voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterStatus {
  pub election_id:     i64,
  pub voter_id:        i64,
  pub is_eligible:     bool,
  pub has_voted:       bool,
  pub voting_method:   Option<VotingMethod>,
  pub tps_id:          Option<i64>,
  pub voted_at:        Option<DateTime<Utc>>,
  /// Anti-replay marker. Not the ballot content.
  pub vote_token_hash: Option<String>,
}

impl VoterStatus {
  /// A freshly registered, eligible voter who has not voted.
  pub fn registered(election_id: i64, voter_id: i64) -> Self {
    Self {
      election_id,
      voter_id,
      is_eligible: true,
      has_voted: false,
      voting_method: None,
      tps_id: None,
      voted_at: None,
      vote_token_hash: None,
    }
  }
}

/// An anonymised ballot. Carries no voter id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
  pub election_id:     i64,
  pub candidate_id:    i64,
  pub method:          VotingMethod,
  pub tps_id:          Option<i64>,
  pub vote_token_hash: String,
  pub cast_at:         DateTime<Utc>,
}

/// Everything a successful cast writes, committed as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastOutcome {
  pub status: VoterStatus,
  pub ballot: Option<Ballot>,
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Decide whether `cast` may proceed against the locked row `current`.
///
/// Checks, in order: eligibility, prior vote, voting window, channel flags.
pub fn authorize_cast(
  current: Option<VoterStatus>,
  election: &Election,
  cast: &CastVote,
  now: DateTime<Utc>,
) -> Result<CastOutcome> {
  let Some(current) = current.filter(|s| s.is_eligible) else {
    return Err(Error::VoterNotEligible);
  };
  if current.has_voted {
    return Err(Error::AlreadyVoted);
  }
  if !election.is_voting_open(now) {
    return Err(Error::VotingNotOpen);
  }
  let method = cast.channel.method();
  if !election.allows(method) {
    return Err(Error::MethodNotAllowed);
  }

  let token_hash = vote_token_hash(cast, now);
  let tps_id = cast.channel.tps_id();

  let ballot = cast.candidate_id.map(|candidate_id| Ballot {
    election_id: cast.election_id,
    candidate_id,
    method,
    tps_id,
    vote_token_hash: token_hash.clone(),
    cast_at: now,
  });

  Ok(CastOutcome {
    status: VoterStatus {
      has_voted: true,
      voting_method: Some(method),
      tps_id,
      voted_at: Some(now),
      vote_token_hash: Some(token_hash),
      ..current
    },
    ballot,
  })
}

/// SHA-256 over the cast coordinates, the timestamp and a random nonce.
fn vote_token_hash(cast: &CastVote, at: DateTime<Utc>) -> String {
  let mut nonce = [0u8; 16];
  OsRng.fill_bytes(&mut nonce);

  let mut hasher = Sha256::new();
  hasher.update(cast.election_id.to_be_bytes());
  hasher.update(cast.voter_id.to_be_bytes());
  hasher.update(cast.channel.method().as_str().as_bytes());
  hasher.update(at.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
  hasher.update(nonce);
  hex::encode(hasher.finalize())
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Entry point for casting votes against a store.
#[derive(Clone)]
pub struct VoteService<S> {
  store: S,
}

impl<S> VoteService<S>
where
  S: VoterStatusStore + ElectionCatalog,
{
  pub fn new(store: S) -> Self { Self { store } }

  /// Cast a vote now.
  pub async fn cast_vote(&self, cast: CastVote) -> Result<VoterStatus> {
    self.cast_vote_at(cast, Utc::now()).await
  }

  /// Cast a vote as if the current time were `now`.
  pub async fn cast_vote_at(&self, cast: CastVote, now: DateTime<Utc>) -> Result<VoterStatus> {
    let election = require_election(&self.store, cast.election_id).await?;

    let decision = self
      .store
      .cast_locked(cast.election_id, cast.voter_id, move |current| {
        authorize_cast(current, &election, &cast, now)
      })
      .await
      .map_err(Error::store)?;

    match decision {
      Ok(status) => {
        info!(
          election_id = cast.election_id,
          voter_id = cast.voter_id,
          method = cast.channel.method().as_str(),
          "vote recorded"
        );
        Ok(status)
      }
      Err(err) => {
        warn!(
          election_id = cast.election_id,
          voter_id = cast.voter_id,
          method = cast.channel.method().as_str(),
          "vote rejected: {err}"
        );
        Err(err)
      }
    }
  }

  /// Cast on behalf of an authenticated voter. The voter id comes from the
  /// token, never from the request.
  pub async fn cast_as(
    &self,
    claims: &Claims,
    election_id: i64,
    candidate_id: Option<i64>,
    channel: VoteChannel,
  ) -> Result<VoterStatus> {
    claims.require_role(Role::VOTERS)?;
    let voter_id = claims.voter_id.ok_or(Error::Forbidden)?;
    self
      .cast_vote(CastVote {
        election_id,
        voter_id,
        candidate_id,
        channel,
      })
      .await
  }

  /// Cast the ballot printed on a scanned QR code at polling station
  /// `tps_id`.
  pub async fn cast_scanned_ballot(
    &self,
    raw_qr: &str,
    voter_id: i64,
    tps_id: i64,
  ) -> Result<VoterStatus> {
    let token = qr::decode(raw_qr)?;
    self
      .cast_vote(CastVote {
        election_id: token.election_id,
        voter_id,
        candidate_id: Some(token.candidate_id),
        channel: VoteChannel::Tps { tps_id },
      })
      .await
  }

  /// Mark a voter eligible for an election. Idempotent; never resets a cast
  /// vote.
  pub async fn register_voter(&self, election_id: i64, voter_id: i64) -> Result<VoterStatus> {
    require_election(&self.store, election_id).await?;
    self
      .store
      .register_voter(election_id, voter_id)
      .await
      .map_err(Error::store)
  }

  pub async fn voter_status(&self, election_id: i64, voter_id: i64) -> Result<Option<VoterStatus>> {
    self
      .store
      .voter_status(election_id, voter_id)
      .await
      .map_err(Error::store)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;
  use crate::election::tests::election_voting_on;

  fn day() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 2, 14, 0, 0, 0).unwrap() }

  fn online(candidate: i64) -> CastVote {
    CastVote {
      election_id:  1,
      voter_id:     70,
      candidate_id: Some(candidate),
      channel:      VoteChannel::Online,
    }
  }

  #[test]
  fn eligible_voter_casts_online() {
    let election = election_voting_on(day());
    let now = day() + Duration::hours(9);
    let outcome =
      authorize_cast(Some(VoterStatus::registered(1, 70)), &election, &online(3), now)
        .unwrap();

    assert!(outcome.status.has_voted);
    assert_eq!(outcome.status.voting_method, Some(VotingMethod::Online));
    assert_eq!(outcome.status.voted_at, Some(now));
    assert_eq!(outcome.status.tps_id, None);
    let hash = outcome.status.vote_token_hash.clone().unwrap();
    assert_eq!(hash.len(), 64);

    let ballot = outcome.ballot.unwrap();
    assert_eq!(ballot.candidate_id, 3);
    assert_eq!(ballot.vote_token_hash, hash);
  }

  #[test]
  fn checks_run_in_order() {
    let mut election = election_voting_on(day());
    election.online_enabled = false;
    let closed = day() - Duration::days(2);

    // Missing row beats everything else.
    assert!(matches!(
      authorize_cast(None, &election, &online(3), closed),
      Err(Error::VoterNotEligible)
    ));

    let mut ineligible = VoterStatus::registered(1, 70);
    ineligible.is_eligible = false;
    assert!(matches!(
      authorize_cast(Some(ineligible), &election, &online(3), closed),
      Err(Error::VoterNotEligible)
    ));

    let mut voted = VoterStatus::registered(1, 70);
    voted.has_voted = true;
    assert!(matches!(
      authorize_cast(Some(voted), &election, &online(3), closed),
      Err(Error::AlreadyVoted)
    ));

    assert!(matches!(
      authorize_cast(Some(VoterStatus::registered(1, 70)), &election, &online(3), closed),
      Err(Error::VotingNotOpen)
    ));

    assert!(matches!(
      authorize_cast(Some(VoterStatus::registered(1, 70)), &election, &online(3), day()),
      Err(Error::MethodNotAllowed)
    ));
  }

  #[test]
  fn tps_vote_records_the_station() {
    let election = election_voting_on(day());
    let cast = CastVote {
      channel: VoteChannel::Tps { tps_id: 4 },
      ..online(2)
    };
    let outcome =
      authorize_cast(Some(VoterStatus::registered(1, 70)), &election, &cast, day()).unwrap();
    assert_eq!(outcome.status.voting_method, Some(VotingMethod::Tps));
    assert_eq!(outcome.status.tps_id, Some(4));
    assert_eq!(outcome.ballot.unwrap().tps_id, Some(4));
  }

  #[test]
  fn vote_without_candidate_writes_no_ballot() {
    let election = election_voting_on(day());
    let cast = CastVote {
      candidate_id: None,
      ..online(1)
    };
    let outcome =
      authorize_cast(Some(VoterStatus::registered(1, 70)), &election, &cast, day()).unwrap();
    assert!(outcome.status.has_voted);
    assert!(outcome.ballot.is_none());
  }

  #[test]
  fn token_hashes_differ_between_casts() {
    let election = election_voting_on(day());
    let a = authorize_cast(Some(VoterStatus::registered(1, 70)), &election, &online(3), day())
      .unwrap();
    let b = authorize_cast(Some(VoterStatus::registered(1, 70)), &election, &online(3), day())
      .unwrap();
    assert_ne!(a.status.vote_token_hash, b.status.vote_token_hash);
  }
}
