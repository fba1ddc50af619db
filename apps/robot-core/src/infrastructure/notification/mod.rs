//! Notification service: the `NotificationSink` the core hands alerts to.
//!
//! ```text
//! enqueue() ──try_send──► bounded queue ──► worker
//!                                             │ kind sent < global interval ago? ──► skip
//!                                             ▼
//!                                        transport.send()  (webhook or log)
//!                                             │ ok
//!                                             ▼
//!                                   state file: kind → last sent
//! ```
//!
//! The per-kind spacing is persisted so it survives process restarts. The
//! per-key limiter of the alert dispatcher runs before this and is not
//! repeated here.

mod webhook;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Notification, NotificationSink};
use crate::config::NotificationsConfig;
use crate::infrastructure::metrics;

pub use webhook::WebhookTransport;

/// Notification delivery errors. Logged and counted, never propagated to the
/// core.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// The request could not be sent.
    #[error("Request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status.
    #[error("Endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The throttle state file could not be written.
    #[error("Failed to persist notification state '{path}': {message}")]
    State {
        /// State file path.
        path: String,
        /// Error message.
        message: String,
    },
}

/// Outbound channel for notifications.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Transport that only logs. Used when no webhook is configured or
/// notifications are disabled.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::warn!(
            key = %notification.key,
            kind = %notification.kind,
            priority = ?notification.priority,
            title = %notification.title,
            body = %notification.message,
            "Notification"
        );
        Ok(())
    }
}

/// Pick the transport the configuration asks for.
pub fn transport_from_config(
    config: &NotificationsConfig,
) -> Result<Arc<dyn NotificationTransport>, NotificationError> {
    match config.webhook() {
        Some(url) if config.enabled => {
            let transport = WebhookTransport::new(url, config.request_timeout())?;
            tracing::info!(url = transport.url(), "Webhook notifications enabled");
            Ok(Arc::new(transport))
        }
        _ => {
            tracing::info!("No webhook configured; notifications are logged only");
            Ok(Arc::new(LogTransport))
        }
    }
}

// ============================================
// Per-kind throttle
// ============================================

/// Last send instant per event kind, persisted as a JSON object.
#[derive(Debug)]
pub struct KindThrottle {
    path: PathBuf,
    min_interval: chrono::Duration,
    last_sent: HashMap<String, DateTime<Utc>>,
}

impl KindThrottle {
    /// Load the state at `path`. A missing file starts empty; an unreadable
    /// one is logged and also starts empty.
    pub async fn load(path: impl Into<PathBuf>, min_interval: chrono::Duration) -> Self {
        let path = path.into();
        let last_sent = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Notification state unreadable; starting empty");
                HashMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Notification state unreadable; starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            min_interval,
            last_sent,
        }
    }

    /// Whether `kind` may be sent at `now`.
    #[must_use]
    pub fn allows(&self, kind: &str, now: DateTime<Utc>) -> bool {
        self.last_sent
            .get(kind)
            .is_none_or(|last| now - *last >= self.min_interval)
    }

    /// Record a send and rewrite the state file.
    pub async fn mark_sent(&mut self, kind: &str, now: DateTime<Utc>) -> Result<(), NotificationError> {
        self.last_sent.insert(kind.to_string(), now);
        persist(&self.path, &self.last_sent).await
    }
}

async fn persist(path: &Path, state: &HashMap<String, DateTime<Utc>>) -> Result<(), NotificationError> {
    let err = |message: String| NotificationError::State {
        path: path.display().to_string(),
        message,
    };
    let json = serde_json::to_vec_pretty(state).map_err(|e| err(e.to_string()))?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| err(e.to_string()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| err(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| err(e.to_string()))
}

// ============================================
// Service
// ============================================

/// Queue-backed notification sink.
#[derive(Debug, Clone)]
pub struct NotificationService {
    tx: mpsc::Sender<Notification>,
}

impl NotificationService {
    /// Start the delivery worker.
    pub fn spawn(
        throttle: KindThrottle,
        transport: Arc<dyn NotificationTransport>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(deliver_loop(rx, throttle, transport, cancel));
        (Self { tx }, handle)
    }
}

impl NotificationSink for NotificationService {
    fn enqueue(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            metrics::record_notification("dropped");
            tracing::warn!(key = %e.into_inner().key, "Notification queue full or closed; dropped");
        }
    }
}

async fn deliver_loop(
    mut rx: mpsc::Receiver<Notification>,
    mut throttle: KindThrottle,
    transport: Arc<dyn NotificationTransport>,
    cancel: CancellationToken,
) {
    tracing::info!(transport = transport.name(), "Notification worker started");
    loop {
        let notification = tokio::select! {
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(notification) => notification,
                None => break,
            },
        };
        deliver(&notification, &mut throttle, transport.as_ref(), Utc::now()).await;
    }

    rx.close();
    while let Some(notification) = rx.recv().await {
        deliver(&notification, &mut throttle, transport.as_ref(), Utc::now()).await;
    }
    tracing::info!("Notification worker stopped");
}

async fn deliver(
    notification: &Notification,
    throttle: &mut KindThrottle,
    transport: &dyn NotificationTransport,
    now: DateTime<Utc>,
) {
    if !throttle.allows(&notification.kind, now) {
        metrics::record_notification("rate_limited");
        tracing::debug!(kind = %notification.kind, key = %notification.key, "Notification kind sent recently; skipped");
        return;
    }

    match transport.send(notification).await {
        Ok(()) => {
            metrics::record_notification("sent");
            if let Err(e) = throttle.mark_sent(&notification.kind, now).await {
                tracing::warn!(error = %e, "Notification state not persisted");
            }
        }
        Err(e) => {
            metrics::record_notification("failed");
            tracing::error!(
                transport = transport.name(),
                key = %notification.key,
                error = %e,
                "Notification delivery failed"
            );
        }
    }
}
