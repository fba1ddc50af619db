//! Observability configuration for logging, metrics and the event log.

use serde::{Deserialize, Serialize};

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prometheus listener port; 0 disables the exporter.
    #[serde(default)]
    pub metrics_port: u16,
    /// Capacity of the event log writer queue.
    #[serde(default = "default_event_log_queue_capacity")]
    pub event_log_queue_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics_port: 0,
            event_log_queue_capacity: default_event_log_queue_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Whether JSON output is selected.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

const fn default_event_log_queue_capacity() -> usize {
    4096
}

fn default_log_level() -> String {
    "robot_core=info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
