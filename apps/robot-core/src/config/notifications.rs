//! Notification service configuration.

use serde::{Deserialize, Serialize};

/// Notification service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Enable outbound notifications. When disabled, notifications are logged only.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Webhook endpoint receiving JSON notifications.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Capacity of the in-memory notification queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Minimum interval between two sends of the same event kind, across restarts.
    #[serde(default = "default_global_min_interval")]
    pub global_min_interval_secs: i64,
    /// File recording the last send per event kind.
    #[serde(default = "default_state_path")]
    pub state_path: String,
    /// Webhook request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            webhook_url: None,
            queue_capacity: default_queue_capacity(),
            global_min_interval_secs: default_global_min_interval(),
            state_path: default_state_path(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl NotificationsConfig {
    /// Global per-kind spacing.
    #[must_use]
    pub fn global_min_interval(&self) -> chrono::Duration {
        super::seconds(self.global_min_interval_secs)
    }

    /// Webhook request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }

    /// Webhook URL when one is configured and non-empty.
    #[must_use]
    pub fn webhook(&self) -> Option<&str> {
        self.webhook_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_queue_capacity() -> usize {
    256
}

const fn default_global_min_interval() -> i64 {
    300
}

fn default_state_path() -> String {
    "state/notification_state.json".to_string()
}

const fn default_request_timeout() -> u64 {
    5000
}
