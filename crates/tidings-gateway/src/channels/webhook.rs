use async_trait::async_trait;
use tracing::debug;

use tidings_types::{ChannelIdentity, NotificationEnvelope};

use super::{DeliveryChannel, DeliveryError, snippet};

/// HTTP push: POSTs the full envelope JSON to a fixed URL.
///
/// The destination travels in headers so one endpoint can fan out further.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(
        &self,
        destination: &ChannelIdentity,
        envelope: &NotificationEnvelope,
    ) -> Result<(), DeliveryError> {
        let resp = self
            .client
            .post(&self.url)
            .header("X-Tidings-Destination", destination.channel_id.to_string())
            .header("X-Tidings-Hash", &envelope.hash)
            .json(envelope)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }

        debug!(url = %self.url, destination = %destination.external_id, "Webhook delivered");
        Ok(())
    }
}
