//! Unified error types for the betting engine.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while bringing the service up.
#[derive(Error, Debug)]
pub enum ArenaError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by engine operations.
///
/// Every variant is returned synchronously to the caller and the transaction
/// that produced it is rolled back.
#[derive(Error, Debug)]
pub enum BettingError {
    /// Betting attempted on a closed or policy-closed market.
    #[error("Betting is closed for this {kind}")]
    MarketClosed {
        /// What the market tracks ("sandbox" or "challenge").
        kind: &'static str,
    },

    /// Stake exceeds the available balance.
    #[error("Insufficient balance")]
    InsufficientBalance {
        /// Requested stake or debit.
        required: Decimal,
        /// Balance at the time of the check.
        available: Decimal,
    },

    /// Referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind ("user", "sandbox", "market", ...).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Non-positive stake or deposit.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Malformed request parameters.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Status change not allowed from the current state.
    #[error("cannot {action} {kind} with status \"{status}\"")]
    InvalidTransition {
        /// Entity kind.
        kind: &'static str,
        /// Attempted action.
        action: &'static str,
        /// Current status.
        status: String,
    },

    /// Underlying storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BettingError {
    /// Shorthand for a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        BettingError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable code, used in API bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            BettingError::MarketClosed { .. } => "market_closed",
            BettingError::InsufficientBalance { .. } => "insufficient_balance",
            BettingError::NotFound { .. } => "not_found",
            BettingError::InvalidAmount(_) => "invalid_amount",
            BettingError::Invalid(_) => "invalid_request",
            BettingError::InvalidTransition { .. } => "invalid_transition",
            BettingError::Store(_) => "storage",
        }
    }
}

impl From<rusqlite::Error> for BettingError {
    fn from(err: rusqlite::Error) -> Self {
        BettingError::Store(StoreError::Sqlite(err))
    }
}

/// Storage layer errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, ArenaError>;
