//! Notification Sink Port (Driven Port)

use serde::{Deserialize, Serialize};

/// Delivery priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationPriority {
    /// Informational.
    Normal,
    /// Needs attention.
    High,
    /// Needs immediate operator action; bypasses per-key rate limiting.
    Emergency,
}

impl NotificationPriority {
    /// Whether this is the highest priority.
    #[must_use]
    pub const fn is_emergency(&self) -> bool {
        matches!(self, Self::Emergency)
    }
}

/// One outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Dedupe key.
    pub key: String,
    /// Event kind, used for the sink's global per-kind interval.
    pub kind: String,
    /// Short title.
    pub title: String,
    /// Message body.
    pub message: String,
    /// Priority.
    pub priority: NotificationPriority,
}

/// Fire-and-forget notification sink. `enqueue` never blocks.
pub trait NotificationSink: Send + Sync {
    /// Queue a notification for delivery.
    fn enqueue(&self, notification: Notification);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Default)]
pub struct NoOpNotificationSink;

impl NotificationSink for NoOpNotificationSink {
    fn enqueue(&self, _notification: Notification) {}
}
