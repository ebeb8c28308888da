//! Implied probabilities and payout multipliers derived from pool totals.

use rust_decimal::Decimal;
use serde::Serialize;

use super::types::{Market, Side};

/// Read-only odds view of a market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Odds {
    /// Implied probability of side A.
    pub prob_yes: Decimal,
    /// Implied probability of side B.
    pub prob_no: Decimal,
    /// Payout multiplier for side A.
    pub multiplier_yes: Decimal,
    /// Payout multiplier for side B.
    pub multiplier_no: Decimal,
    /// Sum of both sides.
    pub total_pool: Decimal,
    /// Whether bets are accepted.
    pub open: bool,
}

impl Odds {
    /// Neutral view used when no market exists.
    pub fn neutral() -> Self {
        let half = Decimal::new(5, 1);
        Self {
            prob_yes: half,
            prob_no: half,
            multiplier_yes: Decimal::ONE,
            multiplier_no: Decimal::ONE,
            total_pool: Decimal::ZERO,
            open: false,
        }
    }

    /// Probability for one side.
    pub fn probability(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.prob_yes,
            Side::No => self.prob_no,
        }
    }

    /// Multiplier for one side.
    pub fn multiplier(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.multiplier_yes,
            Side::No => self.multiplier_no,
        }
    }
}

/// Point-in-time record of a market's implied probabilities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OddsSnapshot {
    /// Market / tracked entity id.
    pub entity_id: String,
    /// Implied probability of side A.
    pub prob_yes: Decimal,
    /// Implied probability of side B.
    pub prob_no: Decimal,
    /// Capture time (unix ms).
    pub recorded_at: i64,
}

impl OddsSnapshot {
    /// Capture the current odds of a market.
    pub fn capture(market: &Market, recorded_at: i64) -> Self {
        let odds = calculate_odds(Some(market));
        Self {
            entity_id: market.entity_id.clone(),
            prob_yes: odds.prob_yes,
            prob_no: odds.prob_no,
            recorded_at,
        }
    }
}

/// Compute odds for a market, or the neutral view when there is none.
pub fn calculate_odds(market: Option<&Market>) -> Odds {
    let Some(market) = market else {
        return Odds::neutral();
    };

    let total = market.total_pool();
    if total.is_zero() {
        return Odds {
            open: market.open,
            ..Odds::neutral()
        };
    }

    Odds {
        prob_yes: market.yes_total / total,
        prob_no: market.no_total / total,
        multiplier_yes: multiplier(total, market.yes_total),
        multiplier_no: multiplier(total, market.no_total),
        total_pool: total,
        open: market.open,
    }
}

/// `total / side_total`, or 1 when the side is empty.
fn multiplier(total: Decimal, side_total: Decimal) -> Decimal {
    if side_total > Decimal::ZERO {
        total / side_total
    } else {
        Decimal::ONE
    }
}
