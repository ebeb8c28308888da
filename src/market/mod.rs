//! Market module for pooled-stake betting.
//!
//! This module handles:
//! - Market and bet records
//! - Odds derived from pool totals and their history snapshots

pub mod odds;
pub mod types;

pub use odds::{calculate_odds, Odds, OddsSnapshot};
pub use types::{Bet, Market, MarketKind, Outcome, Resolution, Side};
