use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use super::{NotificationSender, SenderError};
use crate::alert::models::AlertPayload;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts alert payloads as JSON to a fixed URL
pub struct WebhookSender {
    url: String,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(url: impl Into<String>) -> Result<Self, SenderError> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(SenderError::Network)?;

        Ok(Self { url: url.into(), client })
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, payload: &AlertPayload) -> Result<(), SenderError> {
        let body = serde_json::to_vec(payload)?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(SenderError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SenderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
