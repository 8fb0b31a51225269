//! Prometheus metrics for the stockwatch client.
//!
//! Covers:
//! - Status polling (ticks, swallowed fetch errors, poller releases)
//! - Job state machine transitions
//! - Price lookups (batch vs. per-symbol fallback, unavailable prices)
//! - Read-model refreshes and bulk import/export
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error that surfaces on
//! first use during static initialization.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

/// Status polls that returned a status. Labels: job
pub static POLL_TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stockwatch_poll_ticks_total",
        "Status polls that returned a status",
        &["job"]
    )
    .unwrap()
});

/// Status polls whose fetch failed and was swallowed. Labels: job
pub static POLL_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stockwatch_poll_errors_total",
        "Status polls whose fetch failed",
        &["job"]
    )
    .unwrap()
});

/// Effective poller releases. Labels: job
pub static POLL_STOPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stockwatch_poll_stops_total",
        "Poller handles released",
        &["job"]
    )
    .unwrap()
});

/// Status fetch latency in milliseconds. Labels: job
pub static POLL_FETCH_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "stockwatch_poll_fetch_ms",
        "Status fetch latency in milliseconds",
        &["job"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap()
});

/// Current job state (1 = active). Labels: job, state
pub static JOB_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "stockwatch_job_state",
        "Job state machine current state (1=active, 0=inactive)",
        &["job", "state"]
    )
    .unwrap()
});

/// Job state transitions. Labels: job, to
pub static JOB_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stockwatch_job_transitions_total",
        "Job state machine transitions",
        &["job", "to"]
    )
    .unwrap()
});

/// Price fallback activations. Labels: reason
pub static PRICE_FALLBACK_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stockwatch_price_fallback_total",
        "Batch price failures that switched to per-symbol lookups",
        &["reason"]
    )
    .unwrap()
});

/// Prices resolved as unavailable. Labels: path (batch/fallback)
pub static PRICE_UNAVAILABLE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stockwatch_price_unavailable_total",
        "Symbols whose price resolved as unavailable",
        &["path"]
    )
    .unwrap()
});

/// Read-model refreshes. Labels: outcome (ok/partial/failed)
pub static REFRESH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stockwatch_refresh_total",
        "Read-model refreshes by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Bulk transfers. Labels: kind, op (import/export), outcome
pub static BULK_OPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "stockwatch_bulk_ops_total",
        "Bulk import/export operations by outcome",
        &["kind", "op", "outcome"]
    )
    .unwrap()
});

const JOB_STATES: [&str; 5] = ["idle", "triggering", "running", "completed", "failed"];

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a status poll that returned a status.
    pub fn poll_tick(job: &str, fetch_ms: f64) {
        POLL_TICKS_TOTAL.with_label_values(&[job]).inc();
        POLL_FETCH_MS.with_label_values(&[job]).observe(fetch_ms);
    }

    /// Record a swallowed status fetch failure.
    pub fn poll_error(job: &str) {
        POLL_ERRORS_TOTAL.with_label_values(&[job]).inc();
    }

    /// Record a poller release.
    pub fn poll_stopped(job: &str) {
        POLL_STOPS_TOTAL.with_label_values(&[job]).inc();
    }

    /// Record a job state transition.
    /// Only the new state is set to 1, all others to 0.
    pub fn job_state_set(job: &str, state: &str) {
        for s in &JOB_STATES {
            JOB_STATE.with_label_values(&[job, s]).set(0.0);
        }
        JOB_STATE.with_label_values(&[job, state]).set(1.0);
        JOB_TRANSITIONS_TOTAL.with_label_values(&[job, state]).inc();
    }

    pub fn price_fallback(reason: &str) {
        PRICE_FALLBACK_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn price_unavailable(path: &str, count: usize) {
        PRICE_UNAVAILABLE_TOTAL
            .with_label_values(&[path])
            .inc_by(count as f64);
    }

    pub fn refresh(outcome: &str) {
        REFRESH_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a bulk import/export.
    pub fn bulk_op(kind: &str, op: &str, outcome: &str) {
        BULK_OPS_TOTAL.with_label_values(&[kind, op, outcome]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
