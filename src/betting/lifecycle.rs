//! Bet-window closing policy and timeout handling.
//!
//! A market's window closes early once the outcome is nearly decided:
//! - a sandbox has used 80% of its time budget
//! - a sandbox has reached 90% of its target
//! - the tracked sandbox (or both challenge sandboxes) already finished
//!
//! The policy is checked on every placement and by a periodic sweep.

use rusqlite::Connection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use strum::Display;
use tracing::{debug, info, instrument};

use super::settlement::{self, SettlementSummary};
use crate::entity::registry;
use crate::entity::{Challenge, Sandbox, SandboxStatus};
use crate::error::BettingError;
use crate::market::{Market, MarketKind, OddsSnapshot, Side};
use crate::store::records;

/// Share of the time budget after which betting stops.
pub const WINDOW_TIME_FRACTION: Decimal = dec!(0.8);

/// Share of the target after which betting stops.
pub const WINDOW_PROGRESS_FRACTION: Decimal = dec!(0.9);

/// Why a bet window closed before settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CloseReason {
    /// Most of the time budget is spent.
    TimeBudget,
    /// The goal is almost reached.
    GoalProgress,
    /// The sandbox already finished.
    SandboxFinished,
    /// Both challenge sandboxes finished.
    AgentsFinished,
}

/// Live entity state a market's policy is evaluated against.
#[derive(Debug, Clone)]
pub enum Tracked {
    /// Single-agent market.
    Sandbox(Sandbox),
    /// Head-to-head market.
    Challenge {
        /// Challenge record.
        challenge: Challenge,
        /// Agent backed by side A.
        sandbox_a: Sandbox,
        /// Agent backed by side B.
        sandbox_b: Sandbox,
    },
}

impl Tracked {
    /// Entity kind label.
    pub fn kind(&self) -> MarketKind {
        match self {
            Tracked::Sandbox(_) => MarketKind::Sandbox,
            Tracked::Challenge { .. } => MarketKind::Challenge,
        }
    }

    /// Evaluate the closing policy at `now`.
    pub fn close_reason(&self, now: i64) -> Option<CloseReason> {
        match self {
            Tracked::Sandbox(sandbox) => sandbox_close_reason(sandbox, now),
            Tracked::Challenge {
                sandbox_a,
                sandbox_b,
                ..
            } => challenge_close_reason(sandbox_a, sandbox_b),
        }
    }
}

/// Load the entity a market tracks.
pub fn load_tracked(conn: &Connection, market: &Market) -> Result<Tracked, BettingError> {
    match market.kind {
        MarketKind::Sandbox => Ok(Tracked::Sandbox(registry::require_sandbox(
            conn,
            &market.entity_id,
        )?)),
        MarketKind::Challenge => {
            let challenge = registry::require_challenge(conn, &market.entity_id)?;
            let sandbox_a = registry::require_sandbox(conn, &challenge.sandbox_a)?;
            let sandbox_b = registry::require_sandbox(conn, &challenge.sandbox_b)?;
            Ok(Tracked::Challenge {
                challenge,
                sandbox_a,
                sandbox_b,
            })
        }
    }
}

/// Kind of the entity with this id, if any exists.
pub fn entity_kind(conn: &Connection, entity_id: &str) -> Result<Option<MarketKind>, BettingError> {
    if records::get_sandbox(conn, entity_id)?.is_some() {
        return Ok(Some(MarketKind::Sandbox));
    }
    if records::get_challenge(conn, entity_id)?.is_some() {
        return Ok(Some(MarketKind::Challenge));
    }
    Ok(None)
}

/// Closing policy for a single sandbox.
pub fn sandbox_close_reason(sandbox: &Sandbox, now: i64) -> Option<CloseReason> {
    if sandbox.status.is_terminal() {
        return Some(CloseReason::SandboxFinished);
    }

    let elapsed = Decimal::from(sandbox.elapsed_ms(now));
    let budget = Decimal::from(sandbox.time_limit_secs) * dec!(1000);
    if elapsed >= budget * WINDOW_TIME_FRACTION {
        return Some(CloseReason::TimeBudget);
    }

    if sandbox.progress_ratio() >= WINDOW_PROGRESS_FRACTION {
        return Some(CloseReason::GoalProgress);
    }

    None
}

/// Closing policy for a head-to-head challenge.
pub fn challenge_close_reason(sandbox_a: &Sandbox, sandbox_b: &Sandbox) -> Option<CloseReason> {
    (sandbox_a.status.is_terminal() && sandbox_b.status.is_terminal())
        .then_some(CloseReason::AgentsFinished)
}

/// Close the market of `entity_id` if its window is over.
///
/// The market is read inside the caller's transaction. Returns the reason
/// only when this call flipped the market from open to closed.
pub fn close_if_due(
    conn: &Connection,
    entity_id: &str,
    now: i64,
) -> Result<Option<CloseReason>, BettingError> {
    let Some(market) = records::get_market(conn, entity_id)? else {
        return Ok(None);
    };
    if !market.open {
        return Ok(None);
    }

    let tracked = load_tracked(conn, &market)?;
    let Some(reason) = tracked.close_reason(now) else {
        return Ok(None);
    };

    if !records::close_market(conn, entity_id)? {
        return Ok(None);
    }
    info!(entity = %entity_id, reason = %reason, "Bet window closed");
    Ok(Some(reason))
}

/// Fail an expired sandbox and settle its market for side B.
///
/// Returns `None` when the sandbox is already finished or not yet expired.
#[instrument(skip(conn), fields(sandbox = %sandbox_id))]
pub fn expire_sandbox(
    conn: &Connection,
    sandbox_id: &str,
    now: i64,
) -> Result<Option<ExpiredSandbox>, BettingError> {
    let sandbox = registry::require_sandbox(conn, sandbox_id)?;
    if sandbox.status.is_terminal() || !sandbox.is_expired(now) {
        debug!(status = %sandbox.status, "Sandbox not due for expiry");
        return Ok(None);
    }

    records::set_sandbox_status(conn, sandbox_id, SandboxStatus::Failed)?;
    info!(expires_at = sandbox.expires_at, "Sandbox timed out");

    let settlement = match records::get_market(conn, sandbox_id)? {
        Some(_) => Some(settlement::settle(conn, sandbox_id, Side::No)?),
        None => None,
    };

    Ok(Some(ExpiredSandbox {
        sandbox_id: sandbox_id.to_string(),
        settlement,
    }))
}

/// A sandbox failed by the timeout sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiredSandbox {
    /// Sandbox id.
    pub sandbox_id: String,
    /// Settlement of its market, when it has one.
    pub settlement: Option<SettlementSummary>,
}

/// Record an odds snapshot for the market of `entity_id` if it is still open.
pub fn snapshot_market(
    conn: &Connection,
    entity_id: &str,
    now: i64,
) -> Result<Option<OddsSnapshot>, BettingError> {
    let Some(market) = records::get_market(conn, entity_id)? else {
        return Ok(None);
    };
    if !market.open {
        return Ok(None);
    }

    let snapshot = OddsSnapshot::capture(&market, now);
    records::insert_odds_snapshot(conn, &snapshot)?;
    Ok(Some(snapshot))
}
