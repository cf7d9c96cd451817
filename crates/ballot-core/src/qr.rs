//! Ballot QR codec.
//!
//! Wire format, consumed by the QR printing collaborator and kept
//! byte-compatible across releases:
//!
//! ```text
//! PEMIRA-UNIWA|E:<election_id>|C:<candidate_id>|V:<version>
//! ```
//!
//! The tag must come first. The remaining segments are matched by prefix, so
//! their order does not matter and unknown segments are skipped. This lets
//! newer printers append fields without breaking older scanners.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Leading segment of every ballot payload.
pub const BALLOT_QR_TAG: &str = "PEMIRA-UNIWA";

const SEPARATOR: char = '|';
const MIN_SEGMENTS: usize = 4;

/// The decoded contents of a ballot QR code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BallotToken {
  pub election_id:  i64,
  pub candidate_id: i64,
  pub version:      i64,
}

/// Render the payload for a ballot.
pub fn encode(election_id: i64, candidate_id: i64, version: i64) -> String {
  format!("{BALLOT_QR_TAG}{SEPARATOR}E:{election_id}{SEPARATOR}C:{candidate_id}{SEPARATOR}V:{version}")
}

/// Parse a scanned payload.
///
/// Fails with [`Error::InvalidBallotQr`] when the tag differs, fewer than four
/// segments are present, a field is not a positive integer, or any of the
/// three fields is missing.
pub fn decode(raw: &str) -> Result<BallotToken> {
  let segments: Vec<&str> = raw.split(SEPARATOR).collect();
  if segments.len() < MIN_SEGMENTS || segments[0] != BALLOT_QR_TAG {
    return Err(Error::InvalidBallotQr);
  }

  let mut election_id = 0_i64;
  let mut candidate_id = 0_i64;
  let mut version = 0_i64;

  for segment in &segments[1..] {
    if let Some(value) = segment.strip_prefix("E:") {
      election_id = parse_field(value)?;
    } else if let Some(value) = segment.strip_prefix("C:") {
      candidate_id = parse_field(value)?;
    } else if let Some(value) = segment.strip_prefix("V:") {
      version = parse_field(value)?;
    }
  }

  if election_id == 0 || candidate_id == 0 || version == 0 {
    return Err(Error::InvalidBallotQr);
  }

  Ok(BallotToken {
    election_id,
    candidate_id,
    version,
  })
}

fn parse_field<T>(value: &str) -> Result<T>
where
  T: FromStr + PartialOrd + Default,
{
  match value.parse::<T>() {
    Ok(n) if n >= T::default() => Ok(n),
    _ => Err(Error::InvalidBallotQr),
  }
}

impl fmt::Display for BallotToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&encode(self.election_id, self.candidate_id, self.version))
  }
}

impl FromStr for BallotToken {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { decode(s) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rejects(raw: &str) {
    assert!(
      matches!(decode(raw), Err(Error::InvalidBallotQr)),
      "expected {raw:?} to be rejected"
    );
  }

  #[test]
  fn encodes_the_stable_wire_format() {
    assert_eq!(encode(3, 12, 1), "PEMIRA-UNIWA|E:3|C:12|V:1");
  }

  #[test]
  fn decode_inverts_encode() {
    for (e, c, v) in [(1, 1, 1), (42, 7, 3), (i64::MAX, 900_000_000_001, i64::MAX)] {
      let token = decode(&encode(e, c, v)).unwrap();
      assert_eq!(token, BallotToken {
        election_id:  e,
        candidate_id: c,
        version:      v,
      });
    }
  }

  #[test]
  fn rejects_malformed_payloads() {
    rejects("");
    rejects("PEMIRA|E:1|C:2|V:1");
    rejects("pemira-uniwa|E:1|C:2|V:1");
    rejects("PEMIRA-UNIWA|E:1|C:2");
    rejects("PEMIRA-UNIWA|E:1|C:2|X:9");
    rejects("PEMIRA-UNIWA|E:0|C:2|V:1");
    rejects("PEMIRA-UNIWA|E:1|C:abc|V:1");
    rejects("PEMIRA-UNIWA|E:1|C:2|V:");
    rejects("PEMIRA-UNIWA|E:-4|C:2|V:1");
    rejects("E:1|PEMIRA-UNIWA|C:2|V:1");
  }

  #[test]
  fn versions_beyond_32_bits_decode() {
    let token = decode("PEMIRA-UNIWA|E:1|C:2|V:4294967296").unwrap();
    assert_eq!(token.version, 4_294_967_296);
    rejects("PEMIRA-UNIWA|E:1|C:2|V:9223372036854775808");
  }

  #[test]
  fn fields_match_by_prefix_in_any_order() {
    let token = decode("PEMIRA-UNIWA|V:2|C:5|E:9").unwrap();
    assert_eq!(token.election_id, 9);
    assert_eq!(token.candidate_id, 5);
    assert_eq!(token.version, 2);
  }

  #[test]
  fn unknown_segments_are_ignored() {
    let token = decode("PEMIRA-UNIWA|E:9|T:tps-04|C:5|V:2|SIG:abcdef").unwrap();
    assert_eq!(token, BallotToken {
      election_id:  9,
      candidate_id: 5,
      version:      2,
    });
  }

  #[test]
  fn display_and_from_str_use_the_codec() {
    let token: BallotToken = "PEMIRA-UNIWA|E:4|C:8|V:1".parse().unwrap();
    assert_eq!(token.to_string(), "PEMIRA-UNIWA|E:4|C:8|V:1");
  }
}
