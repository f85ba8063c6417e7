//! Outbound notifications
//!
//! One notification is published per resolved record. Publishing is best
//! effort: callers log a failed publish and carry on.

use crate::config::NotificationConfig;
use crate::domain::errors::BridgeError;
use crate::domain::events::Notification;
use crate::domain::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Destination of outbound notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the structured log
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            category = %notification.category,
            hospital_id = %notification.hospital_id,
            registration_id = %notification.registration_id,
            natural_key = notification.natural_key.as_deref().unwrap_or(""),
            external_id = notification.external_id.as_deref().unwrap_or(""),
            description = notification.description.as_deref().unwrap_or(""),
            "Sync notification"
        );
        Ok(())
    }
}

/// POSTs each notification as JSON to a webhook
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| BridgeError::Notification(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| BridgeError::Notification(format!("webhook request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(BridgeError::Notification(format!(
                "webhook returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Publishes and logs a failure instead of returning it
pub async fn publish_best_effort(sink: &dyn NotificationSink, notification: Notification) {
    if let Err(e) = sink.publish(&notification).await {
        tracing::warn!(
            category = %notification.category,
            registration_id = %notification.registration_id,
            error = %e,
            "Failed to publish notification"
        );
    }
}

/// Creates the sink selected by the configuration
pub fn create_notification_sink(config: &NotificationConfig) -> Result<Arc<dyn NotificationSink>> {
    match config.sink.as_str() {
        "webhook" => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                BridgeError::Configuration(
                    "notifications.webhook_url is required when sink = 'webhook'".to_string(),
                )
            })?;
            Ok(Arc::new(WebhookSink::new(url, config.timeout_seconds)?))
        }
        _ => Ok(Arc::new(LogSink)),
    }
}
