//! SQL schemas for the two aide stores.
//!
//! Executed once at connection startup; idempotent thanks to
//! `CREATE TABLE IF NOT EXISTS`. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Credential pool DDL.
pub const CREDENTIALS_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS credentials (
    id             INTEGER PRIMARY KEY,
    service        TEXT NOT NULL,
    secret         TEXT NOT NULL UNIQUE,
    status         TEXT NOT NULL DEFAULT 'active',  -- 'active' | 'rate_limited' | 'invalid'
    cooldown_until TEXT,                            -- RFC 3339; set iff rate_limited
    usage_count    INTEGER NOT NULL DEFAULT 0,
    last_used      TEXT,
    priority       INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS credentials_service_idx
    ON credentials(service, status);
CREATE INDEX IF NOT EXISTS credentials_order_idx
    ON credentials(priority, usage_count);

PRAGMA user_version = 1;
";

/// Fact store DDL.
pub const FACTS_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Rows are append-only: a new value closes the current row (valid_until set)
-- and inserts a fresh open one in the same transaction.
CREATE TABLE IF NOT EXISTS facts (
    id          INTEGER PRIMARY KEY,
    subject     TEXT NOT NULL,
    attribute   TEXT NOT NULL,
    value       TEXT NOT NULL,
    category    TEXT NOT NULL DEFAULT 'personal',
    confidence  REAL NOT NULL DEFAULT 0.8,
    source      TEXT NOT NULL DEFAULT 'user_input',
    valid_from  TEXT NOT NULL,                      -- RFC 3339 UTC
    valid_until TEXT,                               -- NULL while current
    metadata    TEXT                                -- JSON or NULL
);

CREATE INDEX IF NOT EXISTS facts_key_idx      ON facts(subject, attribute);
CREATE INDEX IF NOT EXISTS facts_validity_idx ON facts(valid_from, valid_until);
CREATE INDEX IF NOT EXISTS facts_category_idx ON facts(category);

PRAGMA user_version = 1;
";
