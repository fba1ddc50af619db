//! Engine orchestrator configuration: timetable polling and bar admission.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::domain::shared::parse_civil_time;

/// Engine orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between timetable polls in seconds.
    #[serde(default = "default_timetable_poll_interval")]
    pub timetable_poll_interval_secs: u64,
    /// Interval of the binary's tick timer in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// How far ahead of engine time a bar may be before it is rejected.
    #[serde(default = "default_future_bar_tolerance")]
    pub future_bar_tolerance_secs: i64,
    /// Session start on the prior civil day for instruments without their own.
    #[serde(default = "default_session_start_time")]
    pub default_session_start_time: String,
    /// Consecutive future-bar rejections that raise a continuous-rejection signal.
    #[serde(default = "default_future_bar_threshold")]
    pub future_bar_rejection_threshold: u32,
    /// Consecutive pre-lock rejections that raise a continuous-rejection signal.
    #[serde(default = "default_pre_lock_threshold")]
    pub pre_lock_rejection_threshold: u32,
    /// Interval of the aggregate rejection report in seconds.
    #[serde(default = "default_report_interval")]
    pub rejection_report_interval_secs: u64,
    /// Rejection rate (0.0 - 1.0) above which the report escalates.
    #[serde(default = "default_rejection_rate_alert")]
    pub rejection_rate_alert: f64,
    /// Minimum processed bars in a window before the rate is judged.
    #[serde(default = "default_rejection_rate_min_bars")]
    pub rejection_rate_min_bars: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timetable_poll_interval_secs: default_timetable_poll_interval(),
            tick_interval_ms: default_tick_interval(),
            future_bar_tolerance_secs: default_future_bar_tolerance(),
            default_session_start_time: default_session_start_time(),
            future_bar_rejection_threshold: default_future_bar_threshold(),
            pre_lock_rejection_threshold: default_pre_lock_threshold(),
            rejection_report_interval_secs: default_report_interval(),
            rejection_rate_alert: default_rejection_rate_alert(),
            rejection_rate_min_bars: default_rejection_rate_min_bars(),
        }
    }
}

impl EngineConfig {
    /// Timetable poll interval.
    #[must_use]
    pub fn timetable_poll_interval(&self) -> chrono::Duration {
        super::seconds(self.timetable_poll_interval_secs)
    }

    /// Future bar tolerance.
    #[must_use]
    pub fn future_bar_tolerance(&self) -> chrono::Duration {
        super::seconds(self.future_bar_tolerance_secs)
    }

    /// Rejection report interval.
    #[must_use]
    pub fn rejection_report_interval(&self) -> chrono::Duration {
        super::seconds(self.rejection_report_interval_secs)
    }

    /// Tick timer period.
    #[must_use]
    pub const fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }

    /// Default session start, `None` when the configured value is not `HH:MM`.
    #[must_use]
    pub fn default_session_start(&self) -> Option<NaiveTime> {
        parse_civil_time(&self.default_session_start_time)
    }
}

const fn default_timetable_poll_interval() -> u64 {
    5
}

const fn default_tick_interval() -> u64 {
    1000
}

const fn default_future_bar_tolerance() -> i64 {
    6
}

fn default_session_start_time() -> String {
    "17:00".to_string()
}

const fn default_future_bar_threshold() -> u32 {
    10
}

const fn default_pre_lock_threshold() -> u32 {
    5
}

const fn default_report_interval() -> u64 {
    300
}

const fn default_rejection_rate_alert() -> f64 {
    0.5
}

const fn default_rejection_rate_min_bars() -> u64 {
    10
}
