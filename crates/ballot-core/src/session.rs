//! Credential and session manager.
//!
//! A login creates a session keyed by the hash of a random refresh token and
//! returns a short-lived access token alongside the raw refresh token.
//! Refresh tokens are single use: every redemption revokes the session it
//! belongs to and creates a successor, forming a rotating chain. A replayed
//! token fails exactly like an unknown one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  password::{Argon2Hasher, DUMMY_HASH, PasswordHasher},
  principal::{Directory, Principal},
  store::SessionStore,
  token::{Claims, TokenIssuer, generate_refresh_token, hash_refresh_token},
};

pub const TOKEN_TYPE: &str = "Bearer";

/// Upper bound on configured lifetimes (ten years).
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Session settings, deserialised from the `[session]` config table.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
  pub jwt_secret:             String,
  #[serde(default = "default_issuer")]
  pub issuer:                 String,
  #[serde(default = "default_access_ttl")]
  pub access_token_ttl_secs:  u64,
  #[serde(default = "default_refresh_ttl")]
  pub refresh_token_ttl_secs: u64,
  /// Allowed clock skew when validating access tokens.
  #[serde(default)]
  pub leeway_secs:            u64,
}

fn default_issuer() -> String { "ballot".to_string() }

fn default_access_ttl() -> u64 { 15 * 60 }

fn default_refresh_ttl() -> u64 { 7 * 24 * 60 * 60 }

fn seconds(secs: u64) -> Duration {
  Duration::seconds(i64::try_from(secs.min(MAX_TTL_SECS)).unwrap_or_default())
}

impl SessionConfig {
  pub fn token_issuer(&self) -> TokenIssuer {
    TokenIssuer::new(
      self.jwt_secret.as_bytes(),
      self.issuer.clone(),
      seconds(self.access_token_ttl_secs),
      self.leeway_secs,
    )
  }

  pub fn refresh_ttl(&self) -> Duration { seconds(self.refresh_token_ttl_secs) }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One link of a refresh-token chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub session_id:   Uuid,
  pub principal_id: i64,
  #[serde(skip_serializing, default)]
  pub token_hash:   String,
  pub user_agent:   Option<String>,
  pub ip_address:   Option<String>,
  pub created_at:   DateTime<Utc>,
  pub expires_at:   DateTime<Utc>,
  pub revoked_at:   Option<DateTime<Utc>>,
}

impl Session {
  /// Not revoked and not yet expired. Terminal sessions never come back.
  pub fn is_active(&self, now: DateTime<Utc>) -> bool {
    self.revoked_at.is_none() && now < self.expires_at
  }
}

/// Input for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
  pub principal_id: i64,
  pub token_hash:   String,
  pub user_agent:   Option<String>,
  pub ip_address:   Option<String>,
  pub expires_at:   DateTime<Utc>,
}

// ─── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
  pub access_token:  String,
  pub refresh_token: String,
  pub token_type:    &'static str,
  /// Access token lifetime in seconds.
  pub expires_in:    i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
  #[serde(flatten)]
  pub tokens:    TokenPair,
  pub principal: Principal,
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Issues, rotates and revokes credentials.
///
/// Holds its signing key and store explicitly; there is no process-wide
/// state.
#[derive(Clone)]
pub struct SessionManager<S, H = Argon2Hasher> {
  store:       S,
  issuer:      TokenIssuer,
  hasher:      H,
  refresh_ttl: Duration,
}

impl<S> SessionManager<S>
where
  S: SessionStore + Directory,
{
  pub fn new(store: S, config: &SessionConfig) -> Self {
    Self::with_hasher(store, config.token_issuer(), config.refresh_ttl(), Argon2Hasher)
  }
}

impl<S, H> SessionManager<S, H>
where
  S: SessionStore + Directory,
  H: PasswordHasher,
{
  pub fn with_hasher(store: S, issuer: TokenIssuer, refresh_ttl: Duration, hasher: H) -> Self {
    Self {
      store,
      issuer,
      hasher,
      refresh_ttl,
    }
  }

  pub fn issuer(&self) -> &TokenIssuer { &self.issuer }

  /// Authenticate with username and password.
  ///
  /// Unknown user and wrong password both yield
  /// [`Error::InvalidCredentials`]. The active flag is only consulted after
  /// the password matched.
  pub async fn login(
    &self,
    username: &str,
    password: &str,
    user_agent: &str,
    ip_address: &str,
  ) -> Result<LoginOutcome> {
    let found = self
      .store
      .principal_by_username(username)
      .await
      .map_err(Error::store)?;

    let Some(principal) = found else {
      // Spend the same verification cost as for a real account.
      let _ = self.hasher.verify(DUMMY_HASH, password);
      warn!("login rejected: invalid credentials");
      return Err(Error::InvalidCredentials);
    };

    if !self.hasher.verify(&principal.password_hash, password) {
      warn!(principal_id = principal.id, "login rejected: invalid credentials");
      return Err(Error::InvalidCredentials);
    }

    if !principal.is_active {
      warn!(principal_id = principal.id, "login rejected: inactive account");
      return Err(Error::InactiveAccount);
    }

    let access_token = self.issuer.issue(&principal)?;
    let refresh_token = generate_refresh_token();
    let session = self
      .store
      .create_session(NewSession {
        principal_id: principal.id,
        token_hash:   hash_refresh_token(&refresh_token),
        user_agent:   non_empty(user_agent),
        ip_address:   non_empty(ip_address),
        expires_at:   Utc::now() + self.refresh_ttl,
      })
      .await
      .map_err(Error::store)?;

    info!(
      principal_id = principal.id,
      session_id = %session.session_id,
      "login succeeded"
    );

    Ok(LoginOutcome {
      tokens: self.token_pair(access_token, refresh_token),
      principal,
    })
  }

  /// Redeem a refresh token for a new access token and a new refresh token.
  pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
    let now = Utc::now();
    let token_hash = hash_refresh_token(refresh_token);

    let session = self
      .store
      .session_by_hash(&token_hash)
      .await
      .map_err(Error::store)?
      .filter(|s| s.is_active(now))
      .ok_or(Error::InvalidOrExpiredToken)?;

    let principal = self
      .store
      .principal_by_id(session.principal_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::InvalidOrExpiredToken)?;

    if !principal.is_active {
      warn!(principal_id = principal.id, "refresh rejected: inactive account");
      return Err(Error::InactiveAccount);
    }

    let access_token = self.issuer.issue(&principal)?;
    let next_token = generate_refresh_token();
    let successor = NewSession {
      principal_id: principal.id,
      token_hash:   hash_refresh_token(&next_token),
      user_agent:   session.user_agent.clone(),
      ip_address:   session.ip_address.clone(),
      expires_at:   now + self.refresh_ttl,
    };

    // Lost a race with a concurrent redemption of the same token.
    let rotated = self
      .store
      .rotate_session(session.session_id, successor, now)
      .await
      .map_err(Error::store)?
      .ok_or(Error::InvalidOrExpiredToken)?;

    info!(
      principal_id = principal.id,
      revoked = %session.session_id,
      session_id = %rotated.session_id,
      "session rotated"
    );

    Ok(self.token_pair(access_token, next_token))
  }

  /// Revoke the session behind a refresh token. Unknown and already revoked
  /// tokens succeed silently.
  pub async fn logout(&self, refresh_token: &str) -> Result<()> {
    let token_hash = hash_refresh_token(refresh_token);
    let Some(session) = self
      .store
      .session_by_hash(&token_hash)
      .await
      .map_err(Error::store)?
    else {
      debug!("logout for unknown session");
      return Ok(());
    };

    let revoked = self
      .store
      .revoke_session(session.session_id, Utc::now())
      .await
      .map_err(Error::store)?;
    if revoked {
      info!(
        principal_id = session.principal_id,
        session_id = %session.session_id,
        "logged out"
      );
    }
    Ok(())
  }

  /// Revoke every session of a principal, e.g. after a password reset.
  pub async fn revoke_all(&self, principal_id: i64) -> Result<usize> {
    let count = self
      .store
      .revoke_all_sessions(principal_id, Utc::now())
      .await
      .map_err(Error::store)?;
    info!(principal_id, count, "revoked all sessions");
    Ok(count)
  }

  pub fn validate_access_token(&self, token: &str) -> Result<Claims> { self.issuer.validate(token) }

  /// Resolve the principal behind validated claims.
  pub async fn current_principal(&self, claims: &Claims) -> Result<Principal> {
    let principal = self
      .store
      .principal_by_id(claims.principal_id())
      .await
      .map_err(Error::store)?
      .ok_or(Error::InvalidToken)?;
    if !principal.is_active {
      return Err(Error::InactiveAccount);
    }
    Ok(principal)
  }

  fn token_pair(&self, access_token: String, refresh_token: String) -> TokenPair {
    TokenPair {
      access_token,
      refresh_token,
      token_type: TOKEN_TYPE,
      expires_in: self.issuer.access_ttl().num_seconds(),
    }
  }
}

fn non_empty(s: &str) -> Option<String> {
  let s = s.trim();
  (!s.is_empty()).then(|| s.to_string())
}
