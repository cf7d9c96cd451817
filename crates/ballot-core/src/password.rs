//! Password hashing collaborator.

use argon2::{
  Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier as _,
  password_hash::SaltString,
};
use rand_core::OsRng;

use crate::{Error, Result};

/// A well-formed argon2id hash that no password produces in practice. Used
/// to spend the same verification cost when the username does not exist.
pub(crate) const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$3q2+7wAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

pub trait PasswordHasher: Send + Sync {
  /// Produce a PHC string for `plaintext`.
  fn hash(&self, plaintext: &str) -> Result<String>;

  /// Check `plaintext` against a stored PHC string. Malformed hashes never
  /// verify.
  fn verify(&self, hash: &str, plaintext: &str) -> bool;
}

/// argon2id with the crate's default parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
  fn hash(&self, plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(plaintext.as_bytes(), &salt)
      .map(|h| h.to_string())
      .map_err(|e| Error::PasswordHash(e.to_string()))
  }

  fn verify(&self, hash: &str, plaintext: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
      return false;
    };
    Argon2::default()
      .verify_password(plaintext.as_bytes(), &parsed)
      .is_ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_then_verify() {
    let hasher = Argon2Hasher;
    let hash = hasher.hash("correct horse").unwrap();
    assert!(hash.starts_with("$argon2id$"));
    assert!(hasher.verify(&hash, "correct horse"));
    assert!(!hasher.verify(&hash, "battery staple"));
  }

  #[test]
  fn malformed_hash_never_verifies() {
    assert!(!Argon2Hasher.verify("not-a-phc-string", "anything"));
    assert!(!Argon2Hasher.verify(DUMMY_HASH, ""));
  }

  #[test]
  fn dummy_hash_is_a_real_argon2id_hash() {
    // A malformed dummy would return early and skip the argon2 work.
    let parsed = PasswordHash::new(DUMMY_HASH).unwrap();
    assert_eq!(parsed.algorithm.as_str(), "argon2id");
    assert!(parsed.hash.is_some());
    assert!(parsed.salt.is_some());
  }
}
