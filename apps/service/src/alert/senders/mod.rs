pub mod webhook;

pub use webhook::WebhookSender;

use async_trait::async_trait;

use super::models::AlertPayload;

#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("sending notification: {0}")]
    Network(#[source] reqwest::Error),
    #[error("encoding notification: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivers alert payloads to an external channel
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, payload: &AlertPayload) -> Result<(), SenderError>;
}
