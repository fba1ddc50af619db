//! Prometheus Metrics Module
//!
//! # Metrics Categories
//!
//! - **Bars**: accepted and rejected bars by instrument and reason
//! - **Timetable**: stand-downs by reason
//! - **Recovery**: recovery state gauge and runs by outcome
//! - **Notifications**: sends, drops and rate-limit skips
//! - **Event log**: dropped records
//!
//! Recording functions are safe to call before (or without) installing the
//! exporter; the `metrics` facade discards values when no recorder is set.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::domain::bar::BarRejectionReason;
use crate::domain::recovery::RecoveryState;
use crate::domain::shared::InstrumentId;

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Install the Prometheus exporter with an HTTP listener on `port`.
///
/// Calling it again after a successful install is a no-op.
pub fn init_metrics(port: u16) -> Result<(), MetricsError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    let _ = INSTALLED.set(addr);
    register_metrics();

    tracing::info!(addr = %addr, "Prometheus metrics exporter started");
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!("robot_core_bars_accepted_total", "Bars admitted to streams");
    describe_counter!(
        "robot_core_bars_rejected_total",
        "Bars rejected by the admission pipeline, by reason"
    );
    describe_counter!(
        "robot_core_stand_downs_total",
        "Stand-downs (trading date and streams cleared), by reason"
    );
    describe_counter!(
        "robot_core_recovery_runs_total",
        "Recovery runner invocations, by outcome"
    );
    describe_gauge!(
        "robot_core_recovery_state",
        "Recovery state (0 CONNECTED_OK .. 4 RECOVERY_COMPLETE)"
    );
    describe_gauge!("robot_core_streams", "Streams registered for the trading date");
    describe_counter!(
        "robot_core_notifications_total",
        "Notifications by outcome (sent, failed, dropped, rate_limited, suppressed)"
    );
    describe_counter!(
        "robot_core_event_log_dropped_total",
        "Event log records dropped because the writer queue was full"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an accepted bar.
pub fn record_bar_accepted(instrument: &InstrumentId) {
    counter!(
        "robot_core_bars_accepted_total",
        "instrument" => instrument.to_string()
    )
    .increment(1);
}

/// Record a rejected bar.
pub fn record_bar_rejected(instrument: &InstrumentId, reason: BarRejectionReason) {
    counter!(
        "robot_core_bars_rejected_total",
        "instrument" => instrument.to_string(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a stand-down.
pub fn record_stand_down(reason: &'static str) {
    counter!("robot_core_stand_downs_total", "reason" => reason).increment(1);
}

/// Record a recovery run outcome.
pub fn record_recovery_run(outcome: &'static str) {
    counter!("robot_core_recovery_runs_total", "outcome" => outcome).increment(1);
}

/// Update the recovery state gauge.
pub fn set_recovery_state(state: RecoveryState) {
    gauge!("robot_core_recovery_state").set(state.gauge_value());
}

/// Update the registered stream count.
pub fn set_streams(count: usize) {
    gauge!("robot_core_streams").set(count as f64);
}

/// Record a notification outcome.
pub fn record_notification(outcome: &'static str) {
    counter!("robot_core_notifications_total", "outcome" => outcome).increment(1);
}

/// Record a dropped event log record.
pub fn record_event_log_dropped() {
    counter!("robot_core_event_log_dropped_total").increment(1);
}
