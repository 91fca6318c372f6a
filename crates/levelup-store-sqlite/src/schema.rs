//! SQL schema for the Level Up! SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id               TEXT PRIMARY KEY,  -- owned by the auth provider
    email                 TEXT NOT NULL,
    name                  TEXT,
    customer_id           TEXT UNIQUE,       -- payments-provider customer
    subscription_id       TEXT,
    subscription_status   TEXT NOT NULL DEFAULT 'INACTIVE',
    subscription_plan     TEXT,
    subscription_end_date TEXT,              -- RFC 3339 UTC or NULL
    created_at            TEXT NOT NULL
);

-- One row per user. JSON columns hold whole field values; writes replace
-- them wholesale.
CREATE TABLE IF NOT EXISTS user_progress (
    user_id          TEXT PRIMARY KEY REFERENCES users(user_id),
    total_stars      INTEGER NOT NULL DEFAULT 0,
    current_streak   INTEGER NOT NULL DEFAULT 0,
    longest_streak   INTEGER NOT NULL DEFAULT 0,
    last_active_date TEXT,                   -- YYYY-MM-DD or NULL
    completed_levels TEXT NOT NULL DEFAULT '[]',
    earned_badges    TEXT NOT NULL DEFAULT '[]',
    level_progress   TEXT NOT NULL DEFAULT '{}',
    calm_down_kit    TEXT NOT NULL DEFAULT '{}',
    my_qualities     TEXT NOT NULL DEFAULT '[]'
);

-- Journals are strictly append-only.
CREATE TABLE IF NOT EXISTS mood_entries (
    entry_id   TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(user_id),
    emoji      TEXT NOT NULL,
    intensity  INTEGER NOT NULL CHECK (intensity BETWEEN 1 AND 10),
    trigger_text TEXT,
    note       TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS iceberg_entries (
    entry_id   TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(user_id),
    behavior   TEXT NOT NULL,
    feeling    TEXT NOT NULL,
    need       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS mood_user_idx    ON mood_entries(user_id, created_at);
CREATE INDEX IF NOT EXISTS iceberg_user_idx ON iceberg_entries(user_id, created_at);

PRAGMA user_version = 1;
";
