use async_trait::async_trait;
use serde::Serialize;

use tidings_types::{ChannelIdentity, NotificationEnvelope};

use super::{DeliveryChannel, DeliveryError, render_text, snippet};

/// Keep SMS bodies within a few concatenated segments.
const MAX_SMS_CHARS: usize = 480;

/// SMS gateway: the destination's external id is the phone number.
pub struct SmsGatewayChannel {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    message: &'a str,
}

impl SmsGatewayChannel {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

/// Loose E.164 check: optional '+', then 6 to 15 digits.
fn is_phone_number(s: &str) -> bool {
    let digits = s.strip_prefix('+').unwrap_or(s);
    (6..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

#[async_trait]
impl DeliveryChannel for SmsGatewayChannel {
    fn name(&self) -> &str {
        "sms"
    }

    async fn send(
        &self,
        destination: &ChannelIdentity,
        envelope: &NotificationEnvelope,
    ) -> Result<(), DeliveryError> {
        if !is_phone_number(&destination.external_id) {
            return Err(DeliveryError::Unsupported(format!(
                "'{}' is not a phone number",
                destination.external_id
            )));
        }

        let text = render_text(envelope, MAX_SMS_CHARS);
        let resp = self
            .client
            .post(&self.url)
            .json(&SmsRequest {
                to: &destination.external_id,
                message: &text,
            })
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
        Ok(())
    }
}
