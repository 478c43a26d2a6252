//! Webhook-backed [`Notifier`] implementation.

use async_trait::async_trait;
use log::debug;
use wreq::Client;
use wreq::header::CONTENT_TYPE;
use wreq::header::HeaderValue;

use crate::entity::RecipientId;
use crate::feed::FeedItem;
use crate::notify::Notifier;
use crate::notify::error::NotifyError;

/// Posts each batch as one JSON document to a configured webhook, which is
/// expected to fan the content out to the actual chat transport.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        recipient: RecipientId,
        items: &[FeedItem],
    ) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "recipient_id": recipient,
            "items": items,
        });
        let body =
            serde_json::to_string(&payload).map_err(|e| NotifyError::delivery(recipient, e))?;

        debug!(
            "Delivering {} item(s) to recipient {recipient} via webhook.",
            items.len()
        );
        let response = self
            .client
            .post(&self.webhook_url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body)
            .send()
            .await
            .map_err(|e| NotifyError::delivery(recipient, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::delivery(recipient, format!("HTTP {status}")));
        }
        Ok(())
    }
}
