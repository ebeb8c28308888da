//! Recurring background sweeps.
//!
//! Three loops run on their own intervals:
//! - timeout auto-settlement
//! - bet-window closing
//! - odds history snapshots
//!
//! Each tick runs the sweep on the blocking pool, so a slow database never
//! stalls the HTTP workers.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::betting::{Engine, SweepReport};
use crate::config::Config;
use crate::error::BettingError;

/// Sweep periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepIntervals {
    /// Timeout auto-settlement period.
    pub auto_settle: Duration,
    /// Bet-window closing period.
    pub window_sweep: Duration,
    /// Odds snapshot period.
    pub odds_snapshot: Duration,
}

impl From<&Config> for SweepIntervals {
    fn from(config: &Config) -> Self {
        Self {
            auto_settle: Duration::from_secs(config.auto_settle_interval_seconds),
            window_sweep: Duration::from_secs(config.window_sweep_interval_seconds),
            odds_snapshot: Duration::from_secs(config.odds_snapshot_interval_seconds),
        }
    }
}

type SweepFn = fn(&Engine) -> Result<SweepReport, BettingError>;

/// Handle to the running sweep loops.
pub struct Scheduler {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn all sweep loops on the current runtime.
    pub fn start(engine: Engine, intervals: SweepIntervals) -> Self {
        let (stop, stop_rx) = watch::channel(false);

        let loops: [(&'static str, Duration, SweepFn); 3] = [
            ("auto_settle", intervals.auto_settle, Engine::auto_settle_expired),
            ("close_windows", intervals.window_sweep, Engine::close_due_markets),
            ("odds_snapshot", intervals.odds_snapshot, Engine::snapshot_odds),
        ];

        let handles = loops
            .into_iter()
            .map(|(name, period, sweep)| {
                tokio::spawn(sweep_loop(name, period, engine.clone(), sweep, stop_rx.clone()))
            })
            .collect();

        info!(
            auto_settle_secs = intervals.auto_settle.as_secs(),
            window_sweep_secs = intervals.window_sweep.as_secs(),
            odds_snapshot_secs = intervals.odds_snapshot.as_secs(),
            "Scheduler started"
        );
        Self { stop, handles }
    }

    /// Signal every loop to stop and wait for the in-flight sweeps.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Sweep task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

/// Run one sweep on the blocking pool.
pub async fn run_sweep(engine: Engine, sweep: SweepFn) -> Option<SweepReport> {
    match tokio::task::spawn_blocking(move || sweep(&engine)).await {
        Ok(Ok(report)) => Some(report),
        Ok(Err(e)) => {
            error!(error = %e, "Sweep failed");
            None
        }
        Err(e) => {
            error!(error = %e, "Sweep task panicked");
            None
        }
    }
}

async fn sweep_loop(
    name: &'static str,
    period: Duration,
    engine: Engine,
    sweep: SweepFn,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(report) = run_sweep(engine.clone(), sweep).await {
                    debug!(
                        sweep = name,
                        examined = report.examined,
                        affected = report.affected.len(),
                        failed = report.failures.len(),
                        "Sweep tick"
                    );
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    debug!(sweep = name, "Sweep loop stopping");
                    break;
                }
            }
        }
    }
}
