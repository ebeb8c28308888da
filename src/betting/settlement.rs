//! Settlement and refund of pooled-stake markets.
//!
//! Payout math lives in [`plan_settlement`], which is pure. [`settle`] and
//! [`refund`] apply a plan inside the caller's transaction.

use rusqlite::Connection;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{info, instrument};

use crate::entity::registry;
use crate::entity::ChallengeStatus;
use crate::error::BettingError;
use crate::ledger;
use crate::market::{Bet, Market, MarketKind, Resolution, Side};
use crate::metrics;
use crate::store::records;

/// Fraction of the total pool kept by the platform.
pub const PLATFORM_TAKE_RATE: Decimal = dec!(0.05);

/// Decimal places kept on each payout. Payouts are truncated, never rounded up.
pub const PAYOUT_SCALE: u32 = 8;

/// Amount owed to one bet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payout {
    /// Bet being paid.
    pub bet_id: String,
    /// Bettor credited.
    pub user_id: String,
    /// Amount credited (zero for losing bets).
    pub amount: Decimal,
}

/// Computed distribution of a market's pool.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementPlan {
    /// Winning side.
    pub winner: Side,
    /// Sum of both sides.
    pub total_pool: Decimal,
    /// `total_pool * PLATFORM_TAKE_RATE`.
    pub platform_take: Decimal,
    /// `total_pool - platform_take`.
    pub distributable: Decimal,
    /// Stake total of the winning side.
    pub winning_pool: Decimal,
    /// One entry per unsettled bet, in placement order.
    pub payouts: Vec<Payout>,
    /// Distributable amount left unpaid.
    pub unallocated: Decimal,
}

impl SettlementPlan {
    /// Sum of all payouts.
    pub fn paid_out(&self) -> Decimal {
        self.payouts.iter().map(|p| p.amount).sum()
    }
}

/// Compute payouts for `bets` when `winner` wins `market`.
///
/// Winning bets share `distributable` pro-rata to stake. The stake share is
/// taken first so the product never exceeds `distributable`. When nobody
/// backed the winner every bet pays zero and the distributable amount stays
/// unallocated.
pub fn plan_settlement(market: &Market, winner: Side, bets: &[Bet]) -> SettlementPlan {
    let total_pool = market.total_pool();
    let platform_take = total_pool * PLATFORM_TAKE_RATE;
    let distributable = total_pool - platform_take;
    let winning_pool = market.side_total(winner);

    let payouts: Vec<Payout> = bets
        .iter()
        .map(|bet| {
            let amount = if bet.side == winner && winning_pool > Decimal::ZERO {
                (bet.stake / winning_pool * distributable)
                    .round_dp_with_strategy(PAYOUT_SCALE, RoundingStrategy::ToZero)
            } else {
                Decimal::ZERO
            };
            Payout {
                bet_id: bet.id.clone(),
                user_id: bet.user_id.clone(),
                amount,
            }
        })
        .collect();

    let paid: Decimal = payouts.iter().map(|p| p.amount).sum();

    SettlementPlan {
        winner,
        total_pool,
        platform_take,
        distributable,
        winning_pool,
        payouts,
        unallocated: distributable - paid,
    }
}

/// Full refunds for every bet.
pub fn plan_refund(bets: &[Bet]) -> Vec<Payout> {
    bets.iter()
        .map(|bet| Payout {
            bet_id: bet.id.clone(),
            user_id: bet.user_id.clone(),
            amount: bet.stake,
        })
        .collect()
}

/// Result of a settle or refund call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementSummary {
    /// Market / tracked entity id.
    pub entity_id: String,
    /// How the market resolved.
    pub resolution: Resolution,
    /// Pool at settlement time.
    pub total_pool: Decimal,
    /// Platform take recorded on the market.
    pub platform_take: Decimal,
    /// Total credited to bettors by this call.
    pub paid_out: Decimal,
    /// Distributable amount nobody could claim.
    pub unallocated: Decimal,
    /// Bets settled by this call.
    pub bets_settled: usize,
    /// True when the market had already been resolved and nothing changed.
    pub already_resolved: bool,
}

impl SettlementSummary {
    fn unchanged(market: &Market, resolution: Resolution) -> Self {
        Self {
            entity_id: market.entity_id.clone(),
            resolution,
            total_pool: market.total_pool(),
            platform_take: market.platform_take.unwrap_or_default(),
            paid_out: Decimal::ZERO,
            unallocated: market.unallocated.unwrap_or_default(),
            bets_settled: 0,
            already_resolved: true,
        }
    }
}

fn require_market(conn: &Connection, entity_id: &str) -> Result<Market, BettingError> {
    records::get_market(conn, entity_id)?.ok_or_else(|| BettingError::not_found("market", entity_id))
}

/// Close a market, pay winners, and record the platform take.
///
/// Idempotent: a market that already carries a resolution is left untouched.
#[instrument(skip(conn), fields(entity = %entity_id, winner = %winner))]
pub fn settle(conn: &Connection, entity_id: &str, winner: Side) -> Result<SettlementSummary, BettingError> {
    let market = require_market(conn, entity_id)?;

    if let Some(resolution) = market.resolution {
        info!(resolution = %resolution, "Market already resolved, skipping settlement");
        return Ok(SettlementSummary::unchanged(&market, resolution));
    }

    let bets = records::unsettled_bets(conn, entity_id)?;
    let plan = plan_settlement(&market, winner, &bets);

    // Closing comes first so nothing can be accepted against the totals read above.
    records::resolve_market(
        conn,
        entity_id,
        Resolution::from(winner),
        Some(plan.platform_take),
        Some(plan.unallocated),
    )?;

    let mut bets_settled = 0;
    for payout in &plan.payouts {
        if !records::settle_bet(conn, &payout.bet_id, payout.amount)? {
            continue;
        }
        bets_settled += 1;
        if payout.amount > Decimal::ZERO {
            ledger::credit(conn, &payout.user_id, payout.amount)?;
        }
    }

    match market.kind {
        MarketKind::Sandbox => {
            if plan.platform_take > Decimal::ZERO {
                registry::add_agent_earnings(conn, entity_id, plan.platform_take)?;
            }
        }
        MarketKind::Challenge => {
            records::set_challenge_status(conn, entity_id, ChallengeStatus::Completed)?;
        }
    }

    info!(
        total_pool = %plan.total_pool,
        platform_take = %plan.platform_take,
        paid_out = %plan.paid_out(),
        unallocated = %plan.unallocated,
        bets = bets_settled,
        "Market settled"
    );
    metrics::inc_markets_settled(Resolution::from(winner));

    Ok(SettlementSummary {
        entity_id: entity_id.to_string(),
        resolution: Resolution::from(winner),
        total_pool: plan.total_pool,
        platform_take: plan.platform_take,
        paid_out: plan.paid_out(),
        unallocated: plan.unallocated,
        bets_settled,
        already_resolved: false,
    })
}

/// Return every unsettled stake in full and close the market.
///
/// No platform take is charged. Already-settled bets are skipped.
#[instrument(skip(conn), fields(entity = %entity_id))]
pub fn refund(conn: &Connection, entity_id: &str) -> Result<SettlementSummary, BettingError> {
    let market = require_market(conn, entity_id)?;

    if let Some(resolution) = market.resolution {
        info!(resolution = %resolution, "Market already resolved, skipping refund");
        return Ok(SettlementSummary::unchanged(&market, resolution));
    }

    let bets = records::unsettled_bets(conn, entity_id)?;
    let payouts = plan_refund(&bets);

    records::resolve_market(conn, entity_id, Resolution::Refunded, None, None)?;

    let mut bets_settled = 0;
    let mut paid_out = Decimal::ZERO;
    for payout in &payouts {
        if !records::settle_bet(conn, &payout.bet_id, payout.amount)? {
            continue;
        }
        bets_settled += 1;
        paid_out += payout.amount;
        ledger::credit(conn, &payout.user_id, payout.amount)?;
    }

    if market.kind == MarketKind::Challenge {
        records::set_challenge_status(conn, entity_id, ChallengeStatus::Completed)?;
    }

    info!(refunded = %paid_out, bets = bets_settled, "Market refunded");
    metrics::inc_markets_settled(Resolution::Refunded);

    Ok(SettlementSummary {
        entity_id: entity_id.to_string(),
        resolution: Resolution::Refunded,
        total_pool: market.total_pool(),
        platform_take: Decimal::ZERO,
        paid_out,
        unallocated: Decimal::ZERO,
        bets_settled,
        already_resolved: false,
    })
}
