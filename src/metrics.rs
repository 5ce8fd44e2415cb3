//! Prometheus metrics for session lifecycle and transaction outcomes.
//!
//! Without an installed recorder (tests, `METRICS_ENABLED=false`) every
//! helper here is a no-op.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Sessions opened counter metric name.
pub const METRIC_SESSIONS_OPENED: &str = "sessions_opened_total";
/// Failed session opens counter metric name.
pub const METRIC_SESSIONS_FAILED: &str = "sessions_failed_total";
/// Sessions released counter metric name.
pub const METRIC_SESSIONS_CLOSED: &str = "sessions_closed_total";
/// Transactions added counter metric name.
pub const METRIC_TRANSACTIONS_ADDED: &str = "transactions_added_total";
/// Failed rule runs counter metric name.
pub const METRIC_RULE_RUNS_FAILED: &str = "rule_runs_failed_total";
/// Request latency metric name.
pub const METRIC_REQUEST_LATENCY: &str = "request_latency_ms";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_counter!(
        METRIC_SESSIONS_OPENED,
        "Total number of sessions opened against the budget server"
    );
    describe_counter!(
        METRIC_SESSIONS_FAILED,
        "Total number of session opens that failed"
    );
    describe_counter!(
        METRIC_SESSIONS_CLOSED,
        "Total number of sessions released"
    );
    describe_counter!(
        METRIC_TRANSACTIONS_ADDED,
        "Total number of transactions committed"
    );
    describe_counter!(
        METRIC_RULE_RUNS_FAILED,
        "Total number of rule runs that failed after commit"
    );
    describe_histogram!(
        METRIC_REQUEST_LATENCY,
        "Handler latency in milliseconds"
    );

    debug!("Metrics initialized");
}

/// Increment sessions opened counter.
pub fn record_session_opened() {
    counter!(METRIC_SESSIONS_OPENED).increment(1);
}

/// Increment failed session opens counter.
pub fn record_session_failed() {
    counter!(METRIC_SESSIONS_FAILED).increment(1);
}

/// Increment sessions released counter.
pub fn record_session_closed() {
    counter!(METRIC_SESSIONS_CLOSED).increment(1);
}

/// Increment transactions added counter.
pub fn inc_transactions_added() {
    counter!(METRIC_TRANSACTIONS_ADDED).increment(1);
}

/// Increment failed rule runs counter.
pub fn inc_rule_runs_failed() {
    counter!(METRIC_RULE_RUNS_FAILED).increment(1);
}

/// RAII guard for timing handlers.
/// Records latency, labelled by endpoint, when dropped.
pub struct LatencyTimer {
    start: Instant,
    endpoint: &'static str,
}

impl LatencyTimer {
    /// Start timing the given endpoint.
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            start: Instant::now(),
            endpoint,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(METRIC_REQUEST_LATENCY, "endpoint" => self.endpoint).record(self.elapsed_ms());
    }
}
