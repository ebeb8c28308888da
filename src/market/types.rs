//! Market and bet records for pooled-stake betting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Side of a market a bet backs.
///
/// For a sandbox market `Yes` backs the agent reaching its goal. For a
/// head-to-head challenge `Yes` backs the first agent and `No` the second.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Side A.
    #[strum(to_string = "yes", serialize = "YES", serialize = "a", serialize = "A")]
    Yes,
    /// Side B.
    #[strum(to_string = "no", serialize = "NO", serialize = "b", serialize = "B")]
    No,
}

/// Ground-truth outcome reported for a tracked entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Goal reached.
    #[strum(to_string = "success", serialize = "SUCCESS")]
    Success,
    /// Goal missed or timed out.
    #[strum(to_string = "failure", serialize = "FAILURE", serialize = "failed")]
    Failure,
}

impl Outcome {
    /// Side that wins when this outcome is reported.
    pub fn winning_side(&self) -> Side {
        match self {
            Outcome::Success => Side::Yes,
            Outcome::Failure => Side::No,
        }
    }
}

/// What a market tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarketKind {
    /// A single agent sandbox.
    Sandbox,
    /// A head-to-head challenge between two sandboxes.
    Challenge,
}

impl MarketKind {
    /// Label used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            MarketKind::Sandbox => "sandbox",
            MarketKind::Challenge => "challenge",
        }
    }
}

/// How a market was finally resolved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Resolution {
    /// Side A won.
    Yes,
    /// Side B won.
    No,
    /// All stakes were returned.
    Refunded,
}

impl From<Side> for Resolution {
    fn from(side: Side) -> Self {
        match side {
            Side::Yes => Resolution::Yes,
            Side::No => Resolution::No,
        }
    }
}

/// Betting pool attached to one tracked entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Market {
    /// Tracked entity id (sandbox or challenge).
    pub entity_id: String,
    /// What the market tracks.
    pub kind: MarketKind,
    /// Cumulative stake on side A.
    pub yes_total: Decimal,
    /// Cumulative stake on side B.
    pub no_total: Decimal,
    /// Whether new bets are accepted.
    pub open: bool,
    /// Platform take recorded at settlement.
    pub platform_take: Option<Decimal>,
    /// Distributable amount nobody could claim, recorded at settlement.
    pub unallocated: Option<Decimal>,
    /// Final resolution, once settled or refunded.
    pub resolution: Option<Resolution>,
    /// Creation time (unix ms).
    pub created_at: i64,
}

impl Market {
    /// Create an empty open market.
    pub fn new(entity_id: impl Into<String>, kind: MarketKind, created_at: i64) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            yes_total: Decimal::ZERO,
            no_total: Decimal::ZERO,
            open: true,
            platform_take: None,
            unallocated: None,
            resolution: None,
            created_at,
        }
    }

    /// Sum of stakes on both sides.
    pub fn total_pool(&self) -> Decimal {
        self.yes_total + self.no_total
    }

    /// Stake total for one side.
    pub fn side_total(&self, side: Side) -> Decimal {
        match side {
            Side::Yes => self.yes_total,
            Side::No => self.no_total,
        }
    }

    /// Side totals after adding `stake` to `side`.
    ///
    /// `None` when either total or their sum would leave the decimal range,
    /// so a stored pool always has a representable total.
    pub fn totals_after_stake(&self, side: Side, stake: Decimal) -> Option<(Decimal, Decimal)> {
        let (yes_total, no_total) = match side {
            Side::Yes => (self.yes_total.checked_add(stake)?, self.no_total),
            Side::No => (self.yes_total, self.no_total.checked_add(stake)?),
        };
        yes_total.checked_add(no_total)?;
        Some((yes_total, no_total))
    }

    /// Multiplier a new stake on `side` would be quoted at, counting the stake itself.
    ///
    /// Assumes [`Market::totals_after_stake`] accepted the stake.
    pub fn odds_after_stake(&self, side: Side, stake: Decimal) -> Decimal {
        let side_after = self.side_total(side) + stake;
        if side_after.is_zero() {
            return Decimal::ONE;
        }
        (self.total_pool() + stake) / side_after
    }
}

/// An individual wager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bet {
    /// Bet id.
    pub id: String,
    /// Market / tracked entity id.
    pub entity_id: String,
    /// Bettor.
    pub user_id: String,
    /// Chosen side.
    pub side: Side,
    /// Stake, fixed at placement.
    pub stake: Decimal,
    /// Multiplier quoted at placement (display only).
    pub odds_at_placement: Decimal,
    /// Whether settlement or refund has been applied.
    pub settled: bool,
    /// Amount credited at settlement.
    pub payout: Option<Decimal>,
    /// Placement time (unix ms).
    pub placed_at: i64,
}
