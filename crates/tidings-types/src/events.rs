use serde::{Deserialize, Serialize};

use crate::envelope::NotificationEnvelope;

/// Inbound update delivered by an instant-messaging bot API webhook.
///
/// Only the fields that reveal identity information are modelled; anything
/// else in the payload is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<BotMessage>,
    #[serde(default)]
    pub edited_message: Option<BotMessage>,
    /// Membership change of the bot itself (added to / removed from a chat).
    #[serde(default)]
    pub my_chat_member: Option<ChatMemberUpdate>,
}

impl BotUpdate {
    /// The message carried by this update, new or edited.
    pub fn any_message(&self) -> Option<&BotMessage> {
        self.message.as_ref().or(self.edited_message.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotMessage {
    pub chat: BotChat,
    #[serde(default)]
    pub from: Option<BotUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMemberUpdate {
    pub chat: BotChat,
    pub from: BotUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub invite_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl BotUser {
    /// "First Last", or just the first name.
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Events sent over the envelope feed WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Sent once on connect with the current chain head
    Ready { writer: String, head: String },

    /// A newly sealed envelope
    Envelope(NotificationEnvelope),
}
