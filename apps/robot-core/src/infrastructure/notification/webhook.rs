//! Webhook transport: POSTs each notification as JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{NotificationError, NotificationTransport};
use crate::application::ports::{Notification, NotificationPriority};

/// JSON body sent to the webhook.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    key: &'a str,
    kind: &'a str,
    title: &'a str,
    message: &'a str,
    priority: NotificationPriority,
    sent_at: chrono::DateTime<chrono::Utc>,
}

impl<'a> WebhookPayload<'a> {
    fn from_notification(notification: &'a Notification) -> Self {
        Self {
            key: &notification.key,
            kind: &notification.kind,
            title: &notification.title,
            message: &notification.message,
            priority: notification.priority,
            sent_at: chrono::Utc::now(),
        }
    }
}

/// HTTP webhook transport.
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: Client,
    url: String,
}

impl WebhookTransport {
    /// Transport posting to `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let payload = WebhookPayload::from_notification(notification);
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
