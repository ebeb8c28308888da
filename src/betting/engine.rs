//! Transactional façade over the betting engine.
//!
//! Each public method is one storage transaction. The `_at` variants take
//! the clock as a parameter; the plain variants use the wall clock.

use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::lifecycle::{self, ExpiredSandbox};
use super::placement::{self, Placement};
use super::settlement::{self, SettlementSummary};
use crate::config::Config;
use crate::entity::{registry, Challenge, NewChallenge, NewSandbox, Sandbox, SandboxStatus};
use crate::error::BettingError;
use crate::ledger::{self, User};
use crate::market::{calculate_odds, Bet, Market, Odds, OddsSnapshot, Outcome, Side};
use crate::metrics;
use crate::store::{records, ArenaStore};
use crate::utils::now_millis;

/// Default number of odds snapshots returned by [`Engine::odds_history`].
pub const ODDS_HISTORY_LIMIT: usize = 500;

/// One entity a sweep could not process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepFailure {
    /// Entity id.
    pub entity_id: String,
    /// Error message.
    pub error: String,
}

/// Summary of one background sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    /// Which sweep ran.
    pub sweep: &'static str,
    /// Entities looked at.
    pub examined: usize,
    /// Entities the sweep changed.
    pub affected: Vec<String>,
    /// Entities that failed; the sweep continued past them.
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    fn new(sweep: &'static str, examined: usize) -> Self {
        Self {
            sweep,
            examined,
            affected: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, entity_id: &str, err: &BettingError) {
        error!(sweep = self.sweep, entity = %entity_id, error = %err, "Sweep failed for entity");
        metrics::inc_sweep_failures(self.sweep);
        self.failures.push(SweepFailure {
            entity_id: entity_id.to_string(),
            error: err.to_string(),
        });
    }
}

/// Betting engine bound to one store.
#[derive(Debug, Clone)]
pub struct Engine {
    store: ArenaStore,
    starting_balance: Decimal,
}

impl Engine {
    /// Create an engine over an opened store.
    pub fn new(store: ArenaStore, starting_balance: Decimal) -> Self {
        Self {
            store,
            starting_balance,
        }
    }

    /// Open the configured database and build an engine over it.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let store = if config.is_in_memory() {
            ArenaStore::open_in_memory()?
        } else {
            ArenaStore::open(
                &config.database_path,
                Duration::from_millis(config.sqlite_busy_timeout_ms),
            )?
        };
        Ok(Self::new(store, config.starting_balance))
    }

    /// Underlying store.
    pub fn store(&self) -> &ArenaStore {
        &self.store
    }

    // === Odds ===

    /// Current odds for an entity's market, or the neutral view when it has none.
    pub fn get_odds(&self, entity_id: &str) -> Result<Odds, BettingError> {
        let market = self.store.read(|conn| records::get_market(conn, entity_id))?;
        Ok(calculate_odds(market.as_ref()))
    }

    /// Raw market record.
    pub fn get_market(&self, entity_id: &str) -> Result<Option<Market>, BettingError> {
        Ok(self.store.read(|conn| records::get_market(conn, entity_id))?)
    }

    /// Odds snapshots oldest-first, at most `limit` (default 500).
    pub fn odds_history(
        &self,
        entity_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<OddsSnapshot>, BettingError> {
        let limit = limit.unwrap_or(ODDS_HISTORY_LIMIT).min(ODDS_HISTORY_LIMIT);
        Ok(self
            .store
            .read(|conn| records::odds_history(conn, entity_id, limit))?)
    }

    // === Bets ===

    /// Place a bet at the current time.
    pub fn place_bet(
        &self,
        entity_id: &str,
        user_id: &str,
        side: Side,
        amount: Decimal,
    ) -> Result<Bet, BettingError> {
        self.place_bet_at(entity_id, user_id, side, amount, now_millis())
    }

    /// Place a bet as of `now`.
    ///
    /// When the closing policy fires, the close is committed and the call
    /// still fails with `MarketClosed`.
    pub fn place_bet_at(
        &self,
        entity_id: &str,
        user_id: &str,
        side: Side,
        amount: Decimal,
        now: i64,
    ) -> Result<Bet, BettingError> {
        let _timer = metrics::timer_place_bet();

        let result = self
            .store
            .write(|tx| placement::place_bet(tx, entity_id, user_id, side, amount, now));

        match result {
            Ok(Placement::Accepted(bet)) => {
                metrics::inc_bets_placed();
                info!(
                    bet = %bet.id,
                    entity = %entity_id,
                    user = %user_id,
                    side = %side,
                    stake = %amount,
                    "Bet placed"
                );
                Ok(bet)
            }
            Ok(Placement::WindowClosed { kind, reason }) => {
                metrics::inc_windows_closed(&reason.to_string());
                metrics::inc_bets_rejected("market_closed");
                Err(BettingError::MarketClosed { kind: kind.label() })
            }
            Err(err) => {
                metrics::inc_bets_rejected(err.code());
                warn!(entity = %entity_id, user = %user_id, error = %err, "Bet rejected");
                Err(err)
            }
        }
    }

    /// Bets on an entity, newest first.
    pub fn bets_for_entity(&self, entity_id: &str) -> Result<Vec<Bet>, BettingError> {
        Ok(self
            .store
            .read(|conn| records::bets_for_entity(conn, entity_id))?)
    }

    /// Bets by a user, newest first.
    pub fn bets_for_user(&self, user_id: &str) -> Result<Vec<Bet>, BettingError> {
        Ok(self
            .store
            .read(|conn| records::bets_for_user(conn, user_id))?)
    }

    // === Settlement ===

    /// Settle a market with `winner` as the winning side.
    pub fn settle(&self, entity_id: &str, winner: Side) -> Result<SettlementSummary, BettingError> {
        let _timer = metrics::timer_settle();
        self.store
            .write(|tx| settlement::settle(tx, entity_id, winner))
    }

    /// Settle a market from a reported outcome.
    pub fn settle_outcome(
        &self,
        entity_id: &str,
        outcome: Outcome,
    ) -> Result<SettlementSummary, BettingError> {
        self.settle(entity_id, outcome.winning_side())
    }

    /// Refund every unsettled stake on a market.
    pub fn refund(&self, entity_id: &str) -> Result<SettlementSummary, BettingError> {
        let _timer = metrics::timer_settle();
        self.store.write(|tx| settlement::refund(tx, entity_id))
    }

    // === Sweeps ===

    /// Fail and settle every sandbox whose time limit has run out.
    pub fn auto_settle_expired(&self) -> Result<SweepReport, BettingError> {
        self.auto_settle_expired_at(now_millis())
    }

    /// Timeout sweep as of `now`. Each sandbox settles in its own transaction.
    #[instrument(skip(self))]
    pub fn auto_settle_expired_at(&self, now: i64) -> Result<SweepReport, BettingError> {
        let start = Instant::now();
        let ids = self
            .store
            .read(|conn| records::expired_unfinished_sandbox_ids(conn, now))?;

        let mut report = SweepReport::new("auto_settle", ids.len());
        for id in &ids {
            match self
                .store
                .write(|tx| lifecycle::expire_sandbox(tx, id, now))
            {
                Ok(Some(ExpiredSandbox { sandbox_id, .. })) => {
                    metrics::inc_sandboxes_expired();
                    report.affected.push(sandbox_id);
                }
                Ok(None) => {}
                Err(err) => report.fail(id, &err),
            }
        }

        metrics::record_sweep_latency(start, report.sweep);
        if !report.affected.is_empty() || !report.failures.is_empty() {
            info!(
                expired = report.affected.len(),
                failed = report.failures.len(),
                "Timeout sweep finished"
            );
        }
        Ok(report)
    }

    /// Close every open market whose bet window is over.
    pub fn close_due_markets(&self) -> Result<SweepReport, BettingError> {
        self.close_due_markets_at(now_millis())
    }

    /// Window sweep as of `now`.
    #[instrument(skip(self))]
    pub fn close_due_markets_at(&self, now: i64) -> Result<SweepReport, BettingError> {
        let start = Instant::now();
        let markets = self.store.read(records::open_markets)?;

        let mut report = SweepReport::new("close_windows", markets.len());
        for market in &markets {
            match self
                .store
                .write(|tx| lifecycle::close_if_due(tx, &market.entity_id, now))
            {
                Ok(Some(reason)) => {
                    metrics::inc_windows_closed(&reason.to_string());
                    report.affected.push(market.entity_id.clone());
                }
                Ok(None) => {}
                Err(err) => report.fail(&market.entity_id, &err),
            }
        }

        metrics::record_sweep_latency(start, report.sweep);
        debug!(closed = report.affected.len(), "Window sweep finished");
        Ok(report)
    }

    /// Record odds for every open market.
    pub fn snapshot_odds(&self) -> Result<SweepReport, BettingError> {
        self.snapshot_odds_at(now_millis())
    }

    /// Odds snapshot sweep as of `now`.
    pub fn snapshot_odds_at(&self, now: i64) -> Result<SweepReport, BettingError> {
        let start = Instant::now();
        let markets = self.store.read(records::open_markets)?;

        let mut report = SweepReport::new("odds_snapshot", markets.len());
        for market in &markets {
            match self
                .store
                .write(|tx| lifecycle::snapshot_market(tx, &market.entity_id, now))
            {
                Ok(Some(_)) => report.affected.push(market.entity_id.clone()),
                Ok(None) => {}
                Err(err) => report.fail(&market.entity_id, &err),
            }
        }

        metrics::record_sweep_latency(start, report.sweep);
        debug!(snapshots = report.affected.len(), "Odds snapshot finished");
        Ok(report)
    }

    // === Ledger ===

    /// Register a user with the starting balance. Emails are unique.
    pub fn create_user(&self, name: &str, email: &str) -> Result<User, BettingError> {
        let user = User::new(name, email, self.starting_balance, now_millis());
        self.store.write(|tx| -> Result<(), BettingError> {
            if records::get_user_by_email(tx, email)?.is_some() {
                return Err(BettingError::Invalid(format!("email {email} already registered")));
            }
            records::insert_user(tx, &user)?;
            Ok(())
        })?;
        info!(user = %user.id, "User created");
        Ok(user)
    }

    /// Return the user with this email, creating it if needed.
    pub fn ensure_user(&self, name: &str, email: &str) -> Result<User, BettingError> {
        let starting_balance = self.starting_balance;
        self.store
            .write(|tx| ledger::ensure_user(tx, name, email, starting_balance, now_millis()))
    }

    /// Load a user.
    pub fn get_user(&self, user_id: &str) -> Result<User, BettingError> {
        self.store.read(|conn| ledger::require_user(conn, user_id))
    }

    /// Credit a positive amount. Returns the new balance.
    pub fn deposit(&self, user_id: &str, amount: Decimal) -> Result<Decimal, BettingError> {
        let balance = self.store.write(|tx| ledger::credit(tx, user_id, amount))?;
        metrics::inc_deposits();
        info!(user = %user_id, amount = %amount, "Deposit credited");
        Ok(balance)
    }

    /// Credit a positive amount to the user with this email.
    pub fn deposit_by_email(&self, email: &str, amount: Decimal) -> Result<Decimal, BettingError> {
        let balance = self.store.write(|tx| {
            let user = records::get_user_by_email(tx, email)?
                .ok_or_else(|| BettingError::not_found("user", email))?;
            ledger::credit(tx, &user.id, amount)
        })?;
        metrics::inc_deposits();
        Ok(balance)
    }

    /// Debit a positive amount. Rejects overdrafts.
    pub fn withdraw(&self, user_id: &str, amount: Decimal) -> Result<Decimal, BettingError> {
        self.store.write(|tx| ledger::debit(tx, user_id, amount))
    }

    // === Sandboxes ===

    /// Register a sandbox with an open market.
    pub fn create_sandbox(&self, new: &NewSandbox) -> Result<Sandbox, BettingError> {
        self.create_sandbox_at(new, now_millis())
    }

    /// Register a sandbox created at `now`.
    pub fn create_sandbox_at(&self, new: &NewSandbox, now: i64) -> Result<Sandbox, BettingError> {
        self.store
            .write(|tx| registry::create_sandbox(tx, new, now))
    }

    /// Load a sandbox.
    pub fn get_sandbox(&self, id: &str) -> Result<Sandbox, BettingError> {
        self.store.read(|conn| registry::require_sandbox(conn, id))
    }

    /// List sandboxes, optionally filtered by status.
    pub fn list_sandboxes(&self, status: Option<SandboxStatus>) -> Result<Vec<Sandbox>, BettingError> {
        Ok(self
            .store
            .read(|conn| records::list_sandboxes(conn, status))?)
    }

    /// Mark a pending sandbox as running.
    pub fn activate_sandbox(&self, id: &str) -> Result<Sandbox, BettingError> {
        self.store.write(|tx| registry::activate(tx, id))
    }

    /// Pause a running sandbox.
    pub fn pause_sandbox(&self, id: &str) -> Result<Sandbox, BettingError> {
        self.store.write(|tx| registry::pause(tx, id))
    }

    /// Resume a paused sandbox.
    pub fn resume_sandbox(&self, id: &str) -> Result<Sandbox, BettingError> {
        self.store.write(|tx| registry::resume(tx, id))
    }

    /// Abort a sandbox and refund its market.
    pub fn stop_sandbox(&self, id: &str) -> Result<Sandbox, BettingError> {
        let (sandbox, _) = self.store.write(|tx| registry::stop(tx, id))?;
        Ok(sandbox)
    }

    /// Record agent progress.
    pub fn update_progress(&self, id: &str, progress: Decimal) -> Result<Sandbox, BettingError> {
        self.store
            .write(|tx| registry::update_progress(tx, id, progress))
    }

    /// Finish a sandbox and settle its market in one transaction.
    pub fn complete_sandbox(
        &self,
        id: &str,
        outcome: Outcome,
    ) -> Result<(Sandbox, Option<SettlementSummary>), BettingError> {
        let _timer = metrics::timer_settle();
        self.store
            .write(|tx| registry::complete(tx, id, outcome))
    }

    // === Challenges ===

    /// Create a head-to-head challenge.
    pub fn create_challenge(&self, new: &NewChallenge) -> Result<Challenge, BettingError> {
        self.create_challenge_at(new, now_millis())
    }

    /// Create a challenge at `now`.
    pub fn create_challenge_at(&self, new: &NewChallenge, now: i64) -> Result<Challenge, BettingError> {
        self.store
            .write(|tx| registry::create_challenge(tx, new, now))
    }

    /// Load a challenge.
    pub fn get_challenge(&self, id: &str) -> Result<Challenge, BettingError> {
        self.store.read(|conn| registry::require_challenge(conn, id))
    }
}
