//! Principals and the directory contract.
//!
//! The directory is owned by the user-management collaborator. The core only
//! needs to resolve a principal by username (login) or id (refresh, "me").

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
  Student,
  Lecturer,
  Staff,
  TpsOperator,
  Admin,
  SuperAdmin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::Student => "STUDENT",
      Role::Lecturer => "LECTURER",
      Role::Staff => "STAFF",
      Role::TpsOperator => "TPS_OPERATOR",
      Role::Admin => "ADMIN",
      Role::SuperAdmin => "SUPER_ADMIN",
    }
  }

  /// Case-insensitive parse of the stored representation.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "STUDENT" => Some(Role::Student),
      "LECTURER" => Some(Role::Lecturer),
      "STAFF" => Some(Role::Staff),
      "TPS_OPERATOR" => Some(Role::TpsOperator),
      "ADMIN" => Some(Role::Admin),
      "SUPER_ADMIN" => Some(Role::SuperAdmin),
      _ => None,
    }
  }

  /// Roles that cast ballots.
  pub const VOTERS: &'static [Role] = &[Role::Student, Role::Lecturer, Role::Staff];

  pub const ADMINS: &'static [Role] = &[Role::Admin, Role::SuperAdmin];
}

/// A principal record as supplied by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
  pub id:            i64,
  pub username:      String,
  /// argon2 PHC string. Never serialised back out.
  #[serde(skip_serializing, default)]
  pub password_hash: String,
  pub role:          Role,
  pub is_active:     bool,
  pub voter_id:      Option<i64>,
  pub tps_id:        Option<i64>,
  pub created_at:    DateTime<Utc>,
}

/// Input for creating a principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
  pub username:      String,
  pub password_hash: String,
  pub role:          Role,
  pub voter_id:      Option<i64>,
  pub tps_id:        Option<i64>,
}

/// Lookup side of the user directory.
pub trait Directory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Retrieve a principal by username. Returns `None` if not found.
  fn principal_by_username<'a>(
    &'a self,
    username: &'a str,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + 'a;

  /// Retrieve a principal by id. Returns `None` if not found.
  fn principal_by_id(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Principal>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn roles_parse_case_insensitively() {
    assert_eq!(Role::parse(" tps_operator "), Some(Role::TpsOperator));
    assert_eq!(Role::parse("Super_Admin"), Some(Role::SuperAdmin));
    assert_eq!(Role::parse("viewer"), None);
    for role in [Role::Student, Role::Lecturer, Role::Staff, Role::Admin] {
      assert_eq!(Role::parse(role.as_str()), Some(role));
    }
  }

  #[test]
  fn password_hash_is_not_serialised() {
    let principal = Principal {
      id:            7,
      username:      "alice".to_string(),
      password_hash: "$argon2id$secret".to_string(),
      role:          Role::Student,
      is_active:     true,
      voter_id:      Some(70),
      tps_id:        None,
      created_at:    Utc::now(),
    };
    let json = serde_json::to_string(&principal).unwrap();
    assert!(!json.contains("argon2"));
    assert!(json.contains("\"role\":\"STUDENT\""));
  }
}
