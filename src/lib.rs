//! Pooled-stake betting and settlement engine for AI agent sandboxes.
//!
//! Viewers bet play money on whether an agent sandbox reaches its goal, or
//! on which of two agents wins a head-to-head challenge. Each tracked entity
//! has one two-sided market; odds follow from the pool totals.
//!
//! # Settlement
//!
//! The platform keeps 5% of the pool. The rest is shared by the winning side
//! in proportion to stake:
//!
//! ```text
//! YES pool:   $60  (one bettor)
//! NO pool:    $40
//! ─────────────────────
//! Total:      $100
//! Take (5%):  $5
//! Payout:     $60 / $60 * $95 = $95
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Market and bet records, odds
//! - [`entity`]: Sandboxes and challenges
//! - [`ledger`]: User balances
//! - [`betting`]: Placement, settlement and sweeps
//! - [`store`]: Transactional SQLite storage
//! - [`scheduler`]: Recurring background sweeps
//! - [`api`]: HTTP API
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod betting;
pub mod config;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod market;
pub mod metrics;
pub mod scheduler;
pub mod store;
pub mod utils;

pub use betting::Engine;
pub use config::Config;
pub use error::{ArenaError, BettingError, Result};
