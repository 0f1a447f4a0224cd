pub mod bot;
pub mod sms;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use tidings_types::{ChannelIdentity, NotificationEnvelope};

pub use bot::BotApiChannel;
pub use sms::SmsGatewayChannel;
pub use webhook::WebhookChannel;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rejected by remote: {0}")]
    Rejected(String),

    #[error("Destination not supported: {0}")]
    Unsupported(String),
}

/// A transport that can push one envelope to one resolved destination.
///
/// Each call succeeds or fails on its own; the notifier never retries.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Short name used in reports and logs.
    fn name(&self) -> &str;

    async fn send(
        &self,
        destination: &ChannelIdentity,
        envelope: &NotificationEnvelope,
    ) -> Result<(), DeliveryError>;
}

/// A channel plus the destination keys (names or channel ids) it serves.
#[derive(Clone)]
pub struct Route {
    pub channel: Arc<dyn DeliveryChannel>,
    pub destinations: Vec<String>,
}

impl Route {
    pub fn new(channel: Arc<dyn DeliveryChannel>, destinations: Vec<String>) -> Self {
        Self {
            channel,
            destinations,
        }
    }
}

/// Plain-text rendering for transports that carry human-readable text.
///
/// One line per message, then the envelope hash. Cut to `max_chars`.
pub fn render_text(envelope: &NotificationEnvelope, max_chars: usize) -> String {
    let mut lines: Vec<String> = envelope
        .messages
        .iter()
        .map(|m| match m {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    lines.push(format!("-- {}", envelope.hash));
    let text = lines.join("\n");

    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// First 200 chars of a response body, for error messages.
pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(200).collect()
}
