//! Betting engine.
//!
//! This module handles:
//! - Bet placement with balance checks and the bet-window policy
//! - Settlement, refunds and timeout auto-settlement
//! - Background sweeps that close windows and snapshot odds

pub mod engine;
pub mod lifecycle;
pub mod placement;
pub mod settlement;

pub use engine::{Engine, SweepFailure, SweepReport, ODDS_HISTORY_LIMIT};
pub use lifecycle::CloseReason;
pub use placement::Placement;
pub use settlement::{plan_settlement, SettlementPlan, SettlementSummary, PLATFORM_TAKE_RATE};
