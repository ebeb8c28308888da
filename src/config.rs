//! Application configuration loaded from environment variables.
//!
//! Logging is set up before configuration loads, from `RUST_LOG`,
//! `LOG_JSON` and `VERBOSE` through the command line.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Storage ===
    /// SQLite database file path.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a writer waits for the database lock, in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub sqlite_busy_timeout_ms: u64,

    // === Ledger ===
    /// Balance granted to newly provisioned users.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,

    // === Scheduler ===
    /// Seconds between timeout auto-settlement sweeps.
    #[serde(default = "default_auto_settle_interval")]
    pub auto_settle_interval_seconds: u64,

    /// Seconds between bet-window closing sweeps.
    #[serde(default = "default_window_sweep_interval")]
    pub window_sweep_interval_seconds: u64,

    /// Seconds between odds history snapshots.
    #[serde(default = "default_odds_snapshot_interval")]
    pub odds_snapshot_interval_seconds: u64,

    // === Server Configuration ===
    /// HTTP server port for the API and health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_database_path() -> String {
    "arena.db".to_string()
}

fn default_busy_timeout() -> u64 {
    5_000
}

fn default_starting_balance() -> Decimal {
    Decimal::new(1000, 0) // $1000
}

fn default_auto_settle_interval() -> u64 {
    60
}

fn default_window_sweep_interval() -> u64 {
    15
}

fn default_odds_snapshot_interval() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            sqlite_busy_timeout_ms: default_busy_timeout(),
            starting_balance: default_starting_balance(),
            auto_settle_interval_seconds: default_auto_settle_interval(),
            window_sweep_interval_seconds: default_window_sweep_interval(),
            odds_snapshot_interval_seconds: default_odds_snapshot_interval(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_path.trim().is_empty() {
            return Err("DATABASE_PATH must not be empty".to_string());
        }

        if self.starting_balance < Decimal::ZERO {
            return Err("STARTING_BALANCE must not be negative".to_string());
        }

        if self.auto_settle_interval_seconds == 0 {
            return Err("AUTO_SETTLE_INTERVAL_SECONDS must be at least 1".to_string());
        }

        if self.window_sweep_interval_seconds == 0 {
            return Err("WINDOW_SWEEP_INTERVAL_SECONDS must be at least 1".to_string());
        }

        if self.odds_snapshot_interval_seconds == 0 {
            return Err("ODDS_SNAPSHOT_INTERVAL_SECONDS must be at least 1".to_string());
        }

        Ok(())
    }

    /// Whether the database lives in memory (tests and demos).
    pub fn is_in_memory(&self) -> bool {
        self.database_path == ":memory:"
    }
}
