use async_trait::async_trait;
use itip::{ItipError, ItipNotification, NotificationSink};
use std::time::Duration;
use url::Url;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers notifications as JSON to the platform's webhook endpoint.
pub struct WebhookSink {
    http: reqwest::Client,
    url: Url,
}

impl WebhookSink {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()?,
            url,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, recipient: &str, notification: ItipNotification) -> itip::Result<()> {
        let payload = serde_json::json!({
            "recipient": recipient,
            "notification": notification,
        });

        let response = self
            .http
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|err| ItipError::Notify(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ItipError::Notify(format!(
                "webhook returned status {status}"
            )));
        }
        Ok(())
    }
}

/// Fallback sink when no webhook is configured.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, recipient: &str, notification: ItipNotification) -> itip::Result<()> {
        tracing::info!(
            recipient,
            mode = ?notification.mode,
            sender = %notification.sender_email,
            summary = notification.summary.as_deref().unwrap_or(""),
            "scheduling notification (no webhook configured)"
        );
        Ok(())
    }
}
