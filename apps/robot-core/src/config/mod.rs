//! Configuration module for the robot core.
//!
//! Loads `config.yaml`, interpolates environment variables and validates
//! every section before the engine is built.
//!
//! # Usage
//!
//! ```rust,ignore
//! use robot_core::config::load_config;
//!
//! let config = load_config(Some("config.yaml"))?;
//! println!("poll every {}s", config.engine.timetable_poll_interval_secs);
//! ```

mod engine;
mod environment;
mod health;
mod notifications;
mod observability;
mod paths;
mod recovery;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use engine::EngineConfig;
pub use environment::EnvironmentConfig;
pub use health::HealthConfig;
pub use notifications::NotificationsConfig;
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use paths::PathsConfig;
pub use recovery::RecoveryConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Engine orchestrator configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Disconnect recovery configuration.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Health monitor configuration.
    #[serde(default)]
    pub health: HealthConfig,
    /// Notification service configuration.
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// File locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Logging, metrics and event log configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Execution mode.
    #[serde(default)]
    pub environment: EnvironmentConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<RobotConfig, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<RobotConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: RobotConfig = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = cap.get(1).map_or("", |m| m.as_str());
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &RobotConfig) -> Result<(), ConfigError> {
    let engine = &config.engine;
    if engine.timetable_poll_interval_secs == 0 {
        return Err(invalid("engine.timetable_poll_interval_secs must be positive"));
    }
    if engine.tick_interval_ms == 0 {
        return Err(invalid("engine.tick_interval_ms must be positive"));
    }
    if engine.future_bar_tolerance_secs < 0 {
        return Err(invalid("engine.future_bar_tolerance_secs must not be negative"));
    }
    if engine.default_session_start().is_none() {
        return Err(invalid(format!(
            "engine.default_session_start_time '{}' is not HH:MM",
            engine.default_session_start_time
        )));
    }
    if engine.future_bar_rejection_threshold == 0 || engine.pre_lock_rejection_threshold == 0 {
        return Err(invalid("engine rejection thresholds must be positive"));
    }
    if engine.rejection_report_interval_secs == 0 {
        return Err(invalid("engine.rejection_report_interval_secs must be positive"));
    }
    if !(engine.rejection_rate_alert > 0.0 && engine.rejection_rate_alert <= 1.0) {
        return Err(invalid("engine.rejection_rate_alert must be in (0.0, 1.0]"));
    }

    let recovery = &config.recovery;
    if recovery.broker_sync_quiet_secs < 0 {
        return Err(invalid("recovery.broker_sync_quiet_secs must not be negative"));
    }
    if recovery.snapshot_timeout_ms == 0 {
        return Err(invalid("recovery.snapshot_timeout_ms must be positive"));
    }
    if recovery.retry_interval_secs < 0
        || recovery.pending_diagnostic_interval_secs < 0
        || recovery.run_report_interval_secs < 0
    {
        return Err(invalid("recovery intervals must not be negative"));
    }
    if recovery.robot_order_prefix.trim().is_empty() {
        return Err(invalid("recovery.robot_order_prefix must not be empty"));
    }

    let health = &config.health;
    if health.evaluation_interval_secs == 0 {
        return Err(invalid("health.evaluation_interval_secs must be positive"));
    }
    if health.engine_tick_stall_secs <= 0
        || health.data_stall_secs <= 0
        || health.connection_loss_alert_secs <= 0
    {
        return Err(invalid("health stall thresholds must be positive"));
    }

    let notifications = &config.notifications;
    if notifications.queue_capacity == 0 {
        return Err(invalid("notifications.queue_capacity must be positive"));
    }
    if let Some(url) = notifications.webhook()
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(invalid("notifications.webhook_url must be an http(s) URL"));
    }

    if config.observability.event_log_queue_capacity == 0 {
        return Err(invalid("observability.event_log_queue_capacity must be positive"));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Whole seconds as a `chrono` duration, saturating instead of panicking.
fn seconds<T: TryInto<i64>>(value: T) -> chrono::Duration {
    value
        .try_into()
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mode::ExecutionMode;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = RobotConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.environment.mode, ExecutionMode::DryRun);
        assert_eq!(config.recovery.snapshot_timeout_ms, 5000);
    }

    #[test]
    fn test_load_empty_config_uses_defaults() {
        let config = load_config_from_string("{}").unwrap();
        assert_eq!(config.engine.timetable_poll_interval_secs, 5);
        assert_eq!(config.health.engine_tick_stall_secs, 120);
    }

    #[test]
    fn test_load_sections() {
        let yaml = r"
engine:
  timetable_poll_interval_secs: 10
recovery:
  robot_order_prefix: 'RC1:'
environment:
  mode: SIM
observability:
  logging:
    format: json
";
        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.engine.timetable_poll_interval_secs, 10);
        assert_eq!(config.recovery.robot_order_prefix, "RC1:");
        assert_eq!(config.environment.mode, ExecutionMode::Sim);
        assert!(config.observability.logging.is_json());
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "mode: ${ROBOT_CORE_CONFIG_TEST_NONEXISTENT_VAR:-SIM}";
        assert_eq!(interpolate_env_vars(input), "mode: SIM");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "webhook_url: ${ROBOT_CORE_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "webhook_url: ");
    }

    #[test]
    fn test_validation_zero_poll_interval() {
        let yaml = "engine:\n  timetable_poll_interval_secs: 0\n";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected validation error");
        };
        assert!(err.to_string().contains("timetable_poll_interval_secs"));
    }

    #[test]
    fn test_validation_empty_order_prefix() {
        let yaml = "recovery:\n  robot_order_prefix: ''\n";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected validation error");
        };
        assert!(err.to_string().contains("robot_order_prefix"));
    }

    #[test]
    fn test_validation_bad_webhook() {
        let yaml = "notifications:\n  webhook_url: ftp://example\n";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_validation_bad_session_start() {
        let yaml = "engine:\n  default_session_start_time: '5pm'\n";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "health:\n  data_stall_secs: 240").unwrap();
        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.health.data_stall_secs, 240);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some("/nonexistent/robot-core.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
