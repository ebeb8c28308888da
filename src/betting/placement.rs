//! Bet placement.

use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::lifecycle::{self, CloseReason};
use crate::error::BettingError;
use crate::ledger;
use crate::market::{Bet, MarketKind, Side};
use crate::store::records;

/// Outcome of a placement attempt that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// Stake debited and bet recorded.
    Accepted(Bet),
    /// The closing policy fired and the market was closed instead.
    ///
    /// The close is a real write: the caller commits it and then reports
    /// the market as closed.
    WindowClosed {
        /// What the market tracks.
        kind: MarketKind,
        /// Which policy rule fired.
        reason: CloseReason,
    },
}

/// Validate and record a bet inside the caller's transaction.
///
/// Checks run in a fixed order and the first failure wins: amount, market,
/// closing policy, then the bettor's balance. A stake the pool totals cannot
/// represent fails with `InvalidAmount`.
#[instrument(skip(conn), fields(entity = %entity_id, user = %user_id, side = %side, amount = %amount))]
pub fn place_bet(
    conn: &Connection,
    entity_id: &str,
    user_id: &str,
    side: Side,
    amount: Decimal,
    now: i64,
) -> Result<Placement, BettingError> {
    if amount <= Decimal::ZERO {
        return Err(BettingError::InvalidAmount(amount));
    }

    let Some(market) = records::get_market(conn, entity_id)? else {
        return Err(match lifecycle::entity_kind(conn, entity_id)? {
            Some(kind) => BettingError::MarketClosed { kind: kind.label() },
            None => BettingError::not_found("market", entity_id),
        });
    };

    if !market.open {
        return Err(BettingError::MarketClosed {
            kind: market.kind.label(),
        });
    }

    let tracked = lifecycle::load_tracked(conn, &market)?;

    if let Some(reason) = tracked.close_reason(now) {
        records::close_market(conn, entity_id)?;
        info!(reason = %reason, "Bet window closed on placement");
        return Ok(Placement::WindowClosed {
            kind: market.kind,
            reason,
        });
    }

    let user = ledger::require_user(conn, user_id)?;
    if user.balance < amount {
        return Err(BettingError::InsufficientBalance {
            required: amount,
            available: user.balance,
        });
    }

    let (yes_total, no_total) = market
        .totals_after_stake(side, amount)
        .ok_or(BettingError::InvalidAmount(amount))?;
    let odds_at_placement = market.odds_after_stake(side, amount);

    ledger::debit(conn, user_id, amount)?;
    records::set_market_totals(conn, entity_id, yes_total, no_total)?;

    let bet = Bet {
        id: Uuid::new_v4().to_string(),
        entity_id: entity_id.to_string(),
        user_id: user_id.to_string(),
        side,
        stake: amount,
        odds_at_placement,
        settled: false,
        payout: None,
        placed_at: now,
    };
    records::insert_bet(conn, &bet)?;

    debug!(bet = %bet.id, odds = %odds_at_placement, "Bet recorded");
    Ok(Placement::Accepted(bet))
}
