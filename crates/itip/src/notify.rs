use crate::Result;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    Cancel,
    Reply,
}

/// What the recipient (cancel) or organizer (reply) is told in place of
/// the suppressed scheduling email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItipNotification {
    pub mode: NotificationMode,
    pub sender_name: String,
    pub sender_email: String,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partstat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<String>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, recipient: &str, notification: ItipNotification) -> Result<()>;
}
