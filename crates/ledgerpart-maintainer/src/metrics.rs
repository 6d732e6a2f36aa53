//! Maintainer metrics.
//!
//! Prometheus-exported metrics for maintenance cycles and individual
//! lifecycle actions, complementing the structured logging in place.

use std::sync::OnceLock;
use std::time::Instant;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// ============================================================================
// Metric Names
// ============================================================================

/// Lifecycle actions executed, labeled by operation and outcome.
pub const ACTIONS_TOTAL: &str = "ledgerpart_actions_total";

/// Maintenance cycle duration in seconds, labeled by cycle kind.
pub const CYCLE_DURATION: &str = "ledgerpart_cycle_duration_seconds";

/// Maintenance cycles completed, labeled by cycle kind.
pub const CYCLES_TOTAL: &str = "ledgerpart_cycles_total";

/// Cycles skipped because a previous one was still running.
pub const CYCLES_SKIPPED_TOTAL: &str = "ledgerpart_cycles_skipped_total";

/// Overflow invariant violations observed.
pub const OVERFLOW_VIOLATIONS_TOTAL: &str = "ledgerpart_overflow_violations_total";

// ============================================================================
// Prometheus Recorder
// ============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the global metrics recorder with Prometheus exporter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
///
/// # Panics
///
/// Panics if the Prometheus recorder cannot be installed: metrics are part
/// of the service contract and the daemon should not start without them.
#[allow(clippy::panic)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .unwrap_or_else(|e| panic!("failed to install prometheus recorder: {e}"));

            describe_counter!(ACTIONS_TOTAL, "Lifecycle actions executed by outcome");
            describe_histogram!(CYCLE_DURATION, "Duration of maintenance cycles in seconds");
            describe_counter!(CYCLES_TOTAL, "Maintenance cycles completed");
            describe_counter!(
                CYCLES_SKIPPED_TOTAL,
                "Cycles skipped because one was already running"
            );
            describe_counter!(
                OVERFLOW_VIOLATIONS_TOTAL,
                "Overflow partition invariant violations observed"
            );

            tracing::info!("Prometheus metrics recorder initialized for maintainer");
            handle
        })
        .clone()
}

/// Returns the global Prometheus handle, if initialized.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Handler for the `/metrics` endpoint.
pub async fn serve_metrics() -> impl IntoResponse {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records one executed lifecycle action.
pub fn record_action(operation: &str, status: &str) {
    counter!(
        ACTIONS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
}

/// Records a skipped tick (previous cycle still running).
pub fn record_skipped_cycle(kind: &str) {
    counter!(CYCLES_SKIPPED_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Records an overflow invariant violation.
pub fn record_overflow_violation() {
    counter!(OVERFLOW_VIOLATIONS_TOTAL).increment(1);
}

/// RAII guard for measuring cycle duration.
pub struct CycleTimer {
    kind: &'static str,
    start: Instant,
}

impl CycleTimer {
    /// Starts timing a cycle of the given kind.
    #[must_use]
    pub fn start(kind: &'static str) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }

    /// Stops the timer and records cycle metrics.
    pub fn finish(self) {
        let labels = [("kind", self.kind.to_string())];
        histogram!(CYCLE_DURATION, &labels).record(self.start.elapsed().as_secs_f64());
        counter!(CYCLES_TOTAL, &labels).increment(1);
    }
}
