//! Prometheus metrics for the betting engine.
//!
//! This module provides metrics for:
//! - Bet placement outcomes and latency
//! - Settlements, refunds and early window closes
//! - Background sweep latency and failures
//! - HTTP request latency

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

use crate::market::Resolution;

// === Metric Name Constants ===

/// Bet placement latency metric name.
pub const METRIC_PLACE_BET_LATENCY: &str = "place_bet_latency_ms";
/// Settlement latency metric name.
pub const METRIC_SETTLE_LATENCY: &str = "settle_latency_ms";
/// Sweep latency metric name.
pub const METRIC_SWEEP_LATENCY: &str = "sweep_latency_ms";
/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Bets accepted counter metric name.
pub const METRIC_BETS_PLACED: &str = "bets_placed_total";
/// Bets rejected counter metric name.
pub const METRIC_BETS_REJECTED: &str = "bets_rejected_total";
/// Markets resolved counter metric name.
pub const METRIC_MARKETS_SETTLED: &str = "markets_settled_total";
/// Early window closes counter metric name.
pub const METRIC_WINDOWS_CLOSED: &str = "bet_windows_closed_total";
/// Sandboxes failed by timeout counter metric name.
pub const METRIC_SANDBOXES_EXPIRED: &str = "sandboxes_expired_total";
/// Per-entity sweep failures counter metric name.
pub const METRIC_SWEEP_FAILURES: &str = "sweep_failures_total";
/// Deposits counter metric name.
pub const METRIC_DEPOSITS: &str = "deposits_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    // Latency histograms
    describe_histogram!(
        METRIC_PLACE_BET_LATENCY,
        "Bet placement transaction latency in milliseconds"
    );
    describe_histogram!(
        METRIC_SETTLE_LATENCY,
        "Settlement transaction latency in milliseconds"
    );
    describe_histogram!(
        METRIC_SWEEP_LATENCY,
        "Background sweep latency in milliseconds"
    );
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );

    // Counters
    describe_counter!(METRIC_BETS_PLACED, "Total number of bets accepted");
    describe_counter!(
        METRIC_BETS_REJECTED,
        "Total number of bets rejected, by reason"
    );
    describe_counter!(
        METRIC_MARKETS_SETTLED,
        "Total number of markets resolved, by resolution"
    );
    describe_counter!(
        METRIC_WINDOWS_CLOSED,
        "Total number of bet windows closed before settlement"
    );
    describe_counter!(
        METRIC_SANDBOXES_EXPIRED,
        "Total number of sandboxes failed by timeout"
    );
    describe_counter!(
        METRIC_SWEEP_FAILURES,
        "Total number of per-entity failures during sweeps"
    );
    describe_counter!(METRIC_DEPOSITS, "Total number of balance deposits");

    debug!("Metrics initialized");
}

/// Install the global Prometheus recorder and return its render handle.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, endpoint: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
}

/// Record sweep latency.
pub fn record_sweep_latency(start: Instant, sweep: &'static str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_SWEEP_LATENCY, "sweep" => sweep).record(latency_ms);
}

/// Increment bets placed counter.
pub fn inc_bets_placed() {
    counter!(METRIC_BETS_PLACED).increment(1);
}

/// Increment bets rejected counter.
pub fn inc_bets_rejected(reason: &'static str) {
    counter!(METRIC_BETS_REJECTED, "reason" => reason).increment(1);
}

/// Increment markets settled counter.
pub fn inc_markets_settled(resolution: Resolution) {
    counter!(METRIC_MARKETS_SETTLED, "resolution" => resolution.to_string()).increment(1);
}

/// Increment early window closes counter.
pub fn inc_windows_closed(reason: &str) {
    counter!(METRIC_WINDOWS_CLOSED, "reason" => reason.to_string()).increment(1);
}

/// Increment expired sandboxes counter.
pub fn inc_sandboxes_expired() {
    counter!(METRIC_SANDBOXES_EXPIRED).increment(1);
}

/// Increment sweep failures counter.
pub fn inc_sweep_failures(sweep: &'static str) {
    counter!(METRIC_SWEEP_FAILURES, "sweep" => sweep).increment(1);
}

/// Increment deposits counter.
pub fn inc_deposits() {
    counter!(METRIC_DEPOSITS).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for bet placement.
pub fn timer_place_bet() -> LatencyTimer {
    LatencyTimer::new(METRIC_PLACE_BET_LATENCY)
}

/// Create a latency timer for settlement.
pub fn timer_settle() -> LatencyTimer {
    LatencyTimer::new(METRIC_SETTLE_LATENCY)
}
