use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tidings_types::{ChannelIdentity, NotificationEnvelope};

use super::{DeliveryChannel, DeliveryError, render_text, snippet};

/// Longest text the bot API accepts in one message.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Instant-messaging bot API (`sendMessage` to a chat id).
pub struct BotApiChannel {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl BotApiChannel {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }
}

#[async_trait]
impl DeliveryChannel for BotApiChannel {
    fn name(&self) -> &str {
        "bot"
    }

    async fn send(
        &self,
        destination: &ChannelIdentity,
        envelope: &NotificationEnvelope,
    ) -> Result<(), DeliveryError> {
        let text = render_text(envelope, MAX_MESSAGE_CHARS);
        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage {
                chat_id: destination.channel_id,
                text: &text,
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(api) if api.ok => Ok(()),
            Ok(api) => Err(DeliveryError::Rejected(
                api.description.unwrap_or_else(|| status.to_string()),
            )),
            Err(_) => Err(DeliveryError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_strips_trailing_slash() {
        let ch = BotApiChannel::new(reqwest::Client::new(), "https://api.example.org/", "123:abc");
        assert_eq!(ch.method_url("sendMessage"), "https://api.example.org/bot123:abc/sendMessage");
    }
}
