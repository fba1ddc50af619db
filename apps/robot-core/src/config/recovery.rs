//! Disconnect recovery configuration.

use serde::{Deserialize, Serialize};

/// Disconnect recovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Quiet window after the last broker update before reconciliation starts.
    #[serde(default = "default_broker_sync_quiet")]
    pub broker_sync_quiet_secs: i64,
    /// Minimum spacing of the "waiting for broker sync" diagnostic.
    #[serde(default = "default_pending_diagnostic_interval")]
    pub pending_diagnostic_interval_secs: i64,
    /// Timeout of the account snapshot call in milliseconds.
    #[serde(default = "default_snapshot_timeout")]
    pub snapshot_timeout_ms: u64,
    /// Minimum delay before a blocked recovery run is retried.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: i64,
    /// Minimum spacing of repeated reports of the same blocked run outcome.
    #[serde(default = "default_run_report_interval")]
    pub run_report_interval_secs: i64,
    /// Tag prefix identifying orders placed by this robot.
    #[serde(default = "default_robot_order_prefix")]
    pub robot_order_prefix: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            broker_sync_quiet_secs: default_broker_sync_quiet(),
            pending_diagnostic_interval_secs: default_pending_diagnostic_interval(),
            snapshot_timeout_ms: default_snapshot_timeout(),
            retry_interval_secs: default_retry_interval(),
            run_report_interval_secs: default_run_report_interval(),
            robot_order_prefix: default_robot_order_prefix(),
        }
    }
}

impl RecoveryConfig {
    /// Quiet window.
    #[must_use]
    pub fn broker_sync_quiet(&self) -> chrono::Duration {
        super::seconds(self.broker_sync_quiet_secs)
    }

    /// Pending diagnostic spacing.
    #[must_use]
    pub fn pending_diagnostic_interval(&self) -> chrono::Duration {
        super::seconds(self.pending_diagnostic_interval_secs)
    }

    /// Snapshot timeout.
    #[must_use]
    pub const fn snapshot_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.snapshot_timeout_ms)
    }

    /// Retry spacing for blocked runs.
    #[must_use]
    pub fn retry_interval(&self) -> chrono::Duration {
        super::seconds(self.retry_interval_secs)
    }

    /// Spacing of repeated blocked-run reports.
    #[must_use]
    pub fn run_report_interval(&self) -> chrono::Duration {
        super::seconds(self.run_report_interval_secs)
    }
}

const fn default_broker_sync_quiet() -> i64 {
    5
}

const fn default_pending_diagnostic_interval() -> i64 {
    5
}

const fn default_snapshot_timeout() -> u64 {
    5000
}

const fn default_retry_interval() -> i64 {
    5
}

const fn default_run_report_interval() -> i64 {
    60
}

fn default_robot_order_prefix() -> String {
    "ROBOT:".to_string()
}
