//! `ballot`: operator command line for the ballot integrity core.
//!
//! Reads `ballot.toml` (or the path given with `--config`), layers `BALLOT_*`
//! environment variables on top, and opens the SQLite store named there.
//!
//! # Usage
//!
//! ```
//! ballot create-user alice --role student --voter-id 7001
//! ballot login alice
//! ballot cast-vote --election 1 --voter 7001 --candidate 3
//! ballot decode-qr 'PEMIRA-UNIWA|E:1|C:3|V:1'
//! ```
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `BALLOT_SESSION__JWT_SECRET`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use ballot_core::{
  election::{Election, ElectionCatalog as _, ElectionStatus},
  password::{Argon2Hasher, PasswordHasher as _},
  phase::{PhaseConflict, PhaseKey, PhaseSchedule, validate_phases},
  principal::{NewPrincipal, Role},
  qr,
  session::{SessionConfig, SessionManager},
  voting::{CastVote, VoteChannel, VoteService, VoterStatus},
};
use ballot_store_sqlite::SqliteStore;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ballot", author, version, about = "Ballot integrity core")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "ballot.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Print the argon2 hash for a password entered on stdin.
  HashPassword,

  /// Add a principal to the directory. The password is read from stdin.
  CreateUser {
    username: String,
    #[arg(long, value_parser = parse_role)]
    role:     Role,
    #[arg(long)]
    voter_id: Option<i64>,
    #[arg(long)]
    tps_id:   Option<i64>,
  },

  /// Log in and print the token pair. The password is read from stdin.
  Login {
    username:   String,
    #[arg(long, default_value = "ballot-cli")]
    user_agent: String,
    #[arg(long, default_value = "")]
    ip:         String,
  },

  /// Redeem a refresh token for a new pair.
  Refresh { refresh_token: String },

  /// Revoke the session behind a refresh token.
  Logout { refresh_token: String },

  /// Validate an access token and print its principal.
  Whoami { access_token: String },

  /// Print the QR payload for a ballot.
  EncodeQr {
    #[arg(long)]
    election:  i64,
    #[arg(long)]
    candidate: i64,
    #[arg(long, default_value_t = 1)]
    version:   i64,
  },

  /// Decode a scanned QR payload.
  DecodeQr { payload: String },

  /// Validate the phase schedule in a TOML file.
  CheckPhases { file: PathBuf },

  /// Create or update an election from a TOML file and publish it.
  CreateElection { file: PathBuf },

  /// Mark a voter eligible for an election.
  RegisterVoter {
    #[arg(long)]
    election: i64,
    #[arg(long)]
    voter:    i64,
  },

  /// Cast a vote online, or at a polling station with `--tps`.
  CastVote {
    #[arg(long)]
    election:  i64,
    #[arg(long)]
    voter:     i64,
    #[arg(long)]
    candidate: Option<i64>,
    #[arg(long)]
    tps:       Option<i64>,
  },

  /// Cast the ballot from a scanned QR payload at a polling station.
  ScanBallot {
    payload: String,
    #[arg(long)]
    voter:   i64,
    #[arg(long)]
    tps:     i64,
  },

  /// Show a voter's status in an election.
  Status {
    #[arg(long)]
    election: i64,
    #[arg(long)]
    voter:    i64,
  },
}

fn parse_role(s: &str) -> Result<Role, String> {
  Role::parse(s).ok_or_else(|| format!("unknown role {s:?}"))
}

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CliConfig {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
  session:    SessionConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("ballot.sqlite") }

/// Shape of the file accepted by `create-election`.
#[derive(Debug, Deserialize)]
struct ElectionFile {
  id:             i64,
  name:           String,
  #[serde(default = "enabled")]
  online_enabled: bool,
  #[serde(default = "enabled")]
  tps_enabled:    bool,
  phases:         PhaseSchedule,
}

fn enabled() -> bool { true }

/// `BALLOT_` prefix, `__` between nested keys.
fn environment() -> config::Environment {
  config::Environment::with_prefix("BALLOT")
    .prefix_separator("_")
    .separator("__")
}

/// Layer the optional TOML file under the environment.
fn load_config(file: &Path, env: config::Environment) -> anyhow::Result<CliConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(file.to_path_buf()).required(false))
    .add_source(env)
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise CliConfig")
}

#[derive(Serialize)]
struct PhaseReport<'a> {
  valid:     bool,
  conflicts: &'a [PhaseConflict],
}

#[derive(Serialize)]
struct StatusReport {
  /// The election's phase right now, if any window contains it.
  phase:  Option<PhaseKey>,
  #[serde(flatten)]
  status: VoterStatus,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  // Commands that need neither config nor store.
  match &cli.command {
    Command::HashPassword => {
      let password = read_password()?;
      println!("{}", Argon2Hasher.hash(&password)?);
      return Ok(());
    }
    Command::EncodeQr {
      election,
      candidate,
      version,
    } => {
      println!("{}", qr::encode(*election, *candidate, *version));
      return Ok(());
    }
    Command::DecodeQr { payload } => {
      return print_json(&qr::decode(payload)?);
    }
    Command::CheckPhases { file } => {
      let schedule: PhaseSchedule = read_toml(file)?;
      return match validate_phases(&schedule) {
        Ok(()) => print_json(&PhaseReport {
          valid:     true,
          conflicts: &[],
        }),
        Err(err) => {
          print_json(&PhaseReport {
            valid:     false,
            conflicts: &err.conflicts,
          })?;
          Err(err.into())
        }
      };
    }
    _ => {}
  }

  let cfg = load_config(&cli.config, environment())?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let sessions = SessionManager::new(store.clone(), &cfg.session);
  let votes = VoteService::new(store.clone());

  match cli.command {
    Command::CreateUser {
      username,
      role,
      voter_id,
      tps_id,
    } => {
      let password = read_password()?;
      let principal = store
        .create_principal(NewPrincipal {
          username,
          password_hash: Argon2Hasher.hash(&password)?,
          role,
          voter_id,
          tps_id,
        })
        .await
        .context("failed to create principal")?;
      print_json(&principal)
    }

    Command::Login {
      username,
      user_agent,
      ip,
    } => {
      let password = read_password()?;
      print_json(&sessions.login(&username, &password, &user_agent, &ip).await?)
    }

    Command::Refresh { refresh_token } => print_json(&sessions.refresh(&refresh_token).await?),

    Command::Logout { refresh_token } => {
      sessions.logout(&refresh_token).await?;
      Ok(())
    }

    Command::Whoami { access_token } => {
      let claims = sessions.validate_access_token(&access_token)?;
      print_json(&sessions.current_principal(&claims).await?)
    }

    Command::CreateElection { file } => {
      let input: ElectionFile = read_toml(&file)?;
      let mut election = Election {
        id:             input.id,
        name:           input.name,
        status:         ElectionStatus::Draft,
        online_enabled: input.online_enabled,
        tps_enabled:    input.tps_enabled,
        phases:         input.phases,
      };
      election.activate()?;
      store
        .put_election(&election)
        .await
        .context("failed to store election")?;
      tracing::info!(election_id = election.id, "election published");
      print_json(&election)
    }

    Command::RegisterVoter { election, voter } => {
      print_json(&votes.register_voter(election, voter).await?)
    }

    Command::CastVote {
      election,
      voter,
      candidate,
      tps,
    } => {
      let channel = match tps {
        Some(tps_id) => VoteChannel::Tps { tps_id },
        None => VoteChannel::Online,
      };
      let status = votes
        .cast_vote(CastVote {
          election_id: election,
          voter_id: voter,
          candidate_id: candidate,
          channel,
        })
        .await?;
      print_json(&status)
    }

    Command::ScanBallot {
      payload,
      voter,
      tps,
    } => print_json(&votes.cast_scanned_ballot(&payload, voter, tps).await?),

    Command::Status { election, voter } => {
      let status = votes
        .voter_status(election, voter)
        .await?
        .with_context(|| format!("voter {voter} is not registered for election {election}"))?;
      let phase = store
        .election(election)
        .await?
        .and_then(|e| e.phases.current_phase(Utc::now()));
      print_json(&StatusReport { phase, status })
    }

    Command::HashPassword
    | Command::EncodeQr { .. }
    | Command::DecodeQr { .. }
    | Command::CheckPhases { .. } => Ok(()),
  }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Deserialise a standalone TOML file through the `config` crate.
fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
  config::Config::builder()
    .add_source(config::File::from(path.to_path_buf()).format(config::FileFormat::Toml))
    .build()
    .and_then(config::Config::try_deserialize)
    .with_context(|| format!("failed to read {}", path.display()))
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  eprint!("Password: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn env(vars: &[(&str, &str)]) -> config::Environment {
    let vars = vars
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    environment().source(Some(vars))
  }

  #[test]
  fn nested_keys_come_from_single_underscore_prefix() {
    let cfg = load_config(
      Path::new("does-not-exist.toml"),
      env(&[
        ("BALLOT_STORE_PATH", "/tmp/ballot-env.sqlite"),
        ("BALLOT_SESSION__JWT_SECRET", "from-env"),
        ("BALLOT_SESSION__ACCESS_TOKEN_TTL_SECS", "60"),
      ]),
    )
    .unwrap();

    assert_eq!(cfg.store_path, PathBuf::from("/tmp/ballot-env.sqlite"));
    assert_eq!(cfg.session.jwt_secret, "from-env");
    assert_eq!(cfg.session.access_token_ttl_secs, 60);
    assert_eq!(cfg.session.issuer, "ballot");
  }

  #[test]
  fn missing_secret_is_an_error() {
    let result = load_config(
      Path::new("does-not-exist.toml"),
      env(&[("BALLOT_STORE_PATH", "x.sqlite")]),
    );
    assert!(result.is_err());
  }
}
