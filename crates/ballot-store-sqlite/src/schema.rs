//! SQL schema for the ballot SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS principals (
    principal_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    username       TEXT    NOT NULL UNIQUE,
    password_hash  TEXT    NOT NULL,   -- argon2 PHC string
    role           TEXT    NOT NULL,   -- 'STUDENT' | 'TPS_OPERATOR' | 'ADMIN' | ...
    is_active      INTEGER NOT NULL DEFAULT 1,
    voter_id       INTEGER,
    tps_id         INTEGER,
    created_at     TEXT    NOT NULL
);

-- One row per refresh token ever issued. Only the SHA-256 of the token is
-- kept. Rows are never deleted, only revoked.
CREATE TABLE IF NOT EXISTS sessions (
    session_id    TEXT    PRIMARY KEY,
    principal_id  INTEGER NOT NULL REFERENCES principals(principal_id),
    token_hash    TEXT    NOT NULL UNIQUE,
    user_agent    TEXT,
    ip_address    TEXT,
    created_at    TEXT    NOT NULL,
    expires_at    TEXT    NOT NULL,
    revoked_at    TEXT
);

CREATE TABLE IF NOT EXISTS elections (
    election_id         INTEGER PRIMARY KEY,
    name                TEXT    NOT NULL,
    status              TEXT    NOT NULL DEFAULT 'DRAFT',
    online_enabled      INTEGER NOT NULL DEFAULT 1,
    tps_enabled         INTEGER NOT NULL DEFAULT 1,
    registration_start  TEXT    NOT NULL,
    registration_end    TEXT    NOT NULL,
    verification_start  TEXT    NOT NULL,
    verification_end    TEXT    NOT NULL,
    campaign_start      TEXT    NOT NULL,
    campaign_end        TEXT    NOT NULL,
    quiet_period_start  TEXT    NOT NULL,
    quiet_period_end    TEXT    NOT NULL,
    voting_start        TEXT    NOT NULL,
    voting_end          TEXT    NOT NULL,
    recap_start         TEXT    NOT NULL,
    recap_end           TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS voter_status (
    election_id      INTEGER NOT NULL REFERENCES elections(election_id),
    voter_id         INTEGER NOT NULL,
    is_eligible      INTEGER NOT NULL DEFAULT 1,
    has_voted        INTEGER NOT NULL DEFAULT 0,
    voting_method    TEXT,              -- 'online' | 'tps'
    tps_id           INTEGER,
    voted_at         TEXT,
    vote_token_hash  TEXT,
    created_at       TEXT    NOT NULL,
    updated_at       TEXT    NOT NULL,
    PRIMARY KEY (election_id, voter_id)
);

-- has_voted only ever moves from 0 to 1 through this store.
CREATE TRIGGER IF NOT EXISTS voter_status_has_voted_one_way
BEFORE UPDATE OF has_voted ON voter_status
WHEN OLD.has_voted = 1 AND NEW.has_voted = 0
BEGIN
    SELECT RAISE(ABORT, 'has_voted cannot be cleared');
END;

-- Anonymised ballots: no voter column.
CREATE TABLE IF NOT EXISTS ballots (
    ballot_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    election_id      INTEGER NOT NULL REFERENCES elections(election_id),
    candidate_id     INTEGER NOT NULL,
    voting_method    TEXT    NOT NULL,
    tps_id           INTEGER,
    vote_token_hash  TEXT    NOT NULL UNIQUE,
    cast_at          TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS sessions_principal_idx ON sessions(principal_id);
CREATE INDEX IF NOT EXISTS ballots_election_idx   ON ballots(election_id, candidate_id);

PRAGMA user_version = 1;
";
