//! Health monitor configuration.

use serde::{Deserialize, Serialize};

/// Health monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Interval of the background evaluation loop.
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,
    /// Sleep after a failed or panicked evaluation.
    #[serde(default = "default_loop_backoff")]
    pub loop_backoff_secs: u64,
    /// Engine tick stall threshold.
    #[serde(default = "default_engine_tick_stall")]
    pub engine_tick_stall_secs: i64,
    /// Per-instrument data stall threshold.
    #[serde(default = "default_data_stall")]
    pub data_stall_secs: i64,
    /// Minimum spacing of data stall log lines per instrument.
    #[serde(default = "default_data_stall_log_interval")]
    pub data_stall_log_interval_secs: i64,
    /// Continuous connection loss that raises the sustained-loss alert.
    #[serde(default = "default_connection_loss_alert")]
    pub connection_loss_alert_secs: i64,
    /// Per-key minimum interval between non-emergency notifications.
    #[serde(default = "default_notification_min_interval")]
    pub notification_min_interval_secs: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: default_evaluation_interval(),
            loop_backoff_secs: default_loop_backoff(),
            engine_tick_stall_secs: default_engine_tick_stall(),
            data_stall_secs: default_data_stall(),
            data_stall_log_interval_secs: default_data_stall_log_interval(),
            connection_loss_alert_secs: default_connection_loss_alert(),
            notification_min_interval_secs: default_notification_min_interval(),
        }
    }
}

impl HealthConfig {
    /// Evaluation loop period.
    #[must_use]
    pub const fn evaluation_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.evaluation_interval_secs)
    }

    /// Backoff after a failed evaluation.
    #[must_use]
    pub const fn loop_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.loop_backoff_secs)
    }

    /// Engine tick stall threshold.
    #[must_use]
    pub fn engine_tick_stall(&self) -> chrono::Duration {
        super::seconds(self.engine_tick_stall_secs)
    }

    /// Data stall threshold.
    #[must_use]
    pub fn data_stall(&self) -> chrono::Duration {
        super::seconds(self.data_stall_secs)
    }

    /// Data stall log spacing.
    #[must_use]
    pub fn data_stall_log_interval(&self) -> chrono::Duration {
        super::seconds(self.data_stall_log_interval_secs)
    }

    /// Sustained connection loss threshold.
    #[must_use]
    pub fn connection_loss_alert(&self) -> chrono::Duration {
        super::seconds(self.connection_loss_alert_secs)
    }

    /// Per-key notification spacing.
    #[must_use]
    pub fn notification_min_interval(&self) -> chrono::Duration {
        super::seconds(self.notification_min_interval_secs)
    }
}

const fn default_evaluation_interval() -> u64 {
    5
}

const fn default_loop_backoff() -> u64 {
    5
}

const fn default_engine_tick_stall() -> i64 {
    120
}

const fn default_data_stall() -> i64 {
    180
}

const fn default_data_stall_log_interval() -> i64 {
    900
}

const fn default_connection_loss_alert() -> i64 {
    60
}

const fn default_notification_min_interval() -> i64 {
    300
}
