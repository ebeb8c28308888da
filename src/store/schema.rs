//! SQLite schema.
//!
//! Currency amounts are stored as canonical decimal TEXT so no value ever
//! passes through a float. Timestamps are unix milliseconds.

/// Connection pragmas applied on open. Journal mode is set separately
/// because that pragma answers with a row.
pub const PRAGMAS_SQL: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
"#;

/// Table and index definitions.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    balance TEXT NOT NULL,
    created_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS sandboxes (
    id TEXT PRIMARY KEY,
    goal_description TEXT NOT NULL,
    goal_type TEXT NOT NULL,
    model TEXT NOT NULL,
    target_value TEXT NOT NULL,
    current_progress TEXT NOT NULL,
    time_limit_secs INTEGER NOT NULL,
    status TEXT NOT NULL,
    agent_earnings TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_sandboxes_status
    ON sandboxes(status, expires_at);

CREATE TABLE IF NOT EXISTS challenges (
    id TEXT PRIMARY KEY,
    goal_description TEXT NOT NULL,
    target_value TEXT NOT NULL,
    sandbox_a TEXT NOT NULL REFERENCES sandboxes(id),
    sandbox_b TEXT NOT NULL REFERENCES sandboxes(id),
    status TEXT NOT NULL,
    session_number INTEGER NOT NULL,
    created_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_challenges_created
    ON challenges(created_at DESC);

CREATE TABLE IF NOT EXISTS markets (
    entity_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    yes_total TEXT NOT NULL,
    no_total TEXT NOT NULL,
    open INTEGER NOT NULL,
    platform_take TEXT,
    unallocated TEXT,
    resolution TEXT,
    created_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_markets_open
    ON markets(open);

CREATE TABLE IF NOT EXISTS bets (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    entity_id TEXT NOT NULL REFERENCES markets(entity_id),
    user_id TEXT NOT NULL REFERENCES users(id),
    side TEXT NOT NULL,
    stake TEXT NOT NULL,
    odds_at_placement TEXT NOT NULL,
    settled INTEGER NOT NULL DEFAULT 0,
    payout TEXT,
    placed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_bets_entity
    ON bets(entity_id, seq);

CREATE INDEX IF NOT EXISTS idx_bets_user
    ON bets(user_id, seq);

CREATE TABLE IF NOT EXISTS odds_history (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL,
    prob_yes TEXT NOT NULL,
    prob_no TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_odds_history_entity_time
    ON odds_history(entity_id, recorded_at);
"#;
