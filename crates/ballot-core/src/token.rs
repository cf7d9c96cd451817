//! Access tokens (signed JWTs) and refresh-token secrets.
//!
//! Access tokens are short-lived HS256 JWTs carrying the principal id and
//! role. Refresh tokens are opaque random strings; only their SHA-256 digest
//! is ever persisted.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
  Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind as JwtErrorKind,
};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{
  Error, Result,
  principal::{Principal, Role},
};

const REFRESH_TOKEN_BYTES: usize = 32;

// ─── Claims ──────────────────────────────────────────────────────────────────

/// The verified contents of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
  /// Principal id.
  pub sub:      i64,
  pub role:     Role,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub voter_id: Option<i64>,
  pub iss:      String,
  pub iat:      i64,
  pub exp:      i64,
}

impl Claims {
  pub fn principal_id(&self) -> i64 { self.sub }

  /// Fail with [`Error::Forbidden`] unless the caller holds one of `allowed`.
  pub fn require_role(&self, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&self.role) {
      Ok(())
    } else {
      Err(Error::Forbidden)
    }
  }
}

// ─── Issuer ──────────────────────────────────────────────────────────────────

/// Signs and verifies access tokens with a single symmetric key.
///
/// Constructed explicitly and passed around, so tests can run side by side
/// with distinct keys.
#[derive(Clone)]
pub struct TokenIssuer {
  encoding:   EncodingKey,
  decoding:   DecodingKey,
  issuer:     String,
  access_ttl: Duration,
  leeway:     u64,
}

impl TokenIssuer {
  pub fn new(secret: &[u8], issuer: impl Into<String>, access_ttl: Duration, leeway: u64) -> Self {
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
      issuer: issuer.into(),
      access_ttl,
      leeway,
    }
  }

  pub fn access_ttl(&self) -> Duration { self.access_ttl }

  /// Issue an access token for `principal`, valid from now.
  pub fn issue(&self, principal: &Principal) -> Result<String> {
    self.issue_at(principal, Utc::now())
  }

  /// Issue an access token as if the current time were `now`.
  pub fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String> {
    let claims = Claims {
      sub:      principal.id,
      role:     principal.role,
      voter_id: principal.voter_id,
      iss:      self.issuer.clone(),
      iat:      now.timestamp(),
      exp:      (now + self.access_ttl).timestamp(),
    };
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
      .map_err(|e| Error::TokenIssue(e.to_string()))
  }

  /// Verify signature, issuer and lifetime.
  ///
  /// An expired token yields [`Error::ExpiredToken`]; every other problem
  /// collapses into [`Error::InvalidToken`].
  pub fn validate(&self, token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = self.leeway;
    validation.set_issuer(&[&self.issuer]);
    validation.set_required_spec_claims(&["exp", "iss"]);

    let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
      .map_err(|e| match e.kind() {
        JwtErrorKind::ExpiredSignature => Error::ExpiredToken,
        _ => Error::InvalidToken,
      })?;

    // Reject tokens minted in the future beyond the allowed skew.
    let skew = i64::try_from(self.leeway).unwrap_or(i64::MAX);
    if data.claims.iat > Utc::now().timestamp().saturating_add(skew) {
      return Err(Error::InvalidToken);
    }

    Ok(data.claims)
  }
}

// ─── Refresh tokens ──────────────────────────────────────────────────────────

/// A fresh 256-bit refresh token, base64url encoded.
pub fn generate_refresh_token() -> String {
  let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
  OsRng.fill_bytes(&mut bytes);
  URL_SAFE_NO_PAD.encode(bytes)
}

/// One-way digest under which a refresh token is stored and looked up.
pub fn hash_refresh_token(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}
