use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which kind of external messaging principal an identity describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    User,
    Group,
}

impl IdentityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing record binding an external principal to a transport address.
///
/// Users are keyed by `external_id` (platform username or numeric user id).
/// Groups are keyed by `channel_id`; their `external_id` is the chat title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIdentity {
    pub kind: IdentityKind,
    pub external_id: String,
    pub channel_id: i64,
    pub display_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_link: Option<String>,
}

impl ChannelIdentity {
    pub fn user(external_id: impl Into<String>, display_names: Vec<String>, channel_id: i64) -> Self {
        Self {
            kind: IdentityKind::User,
            external_id: external_id.into(),
            channel_id,
            display_names,
            invite_link: None,
        }
    }

    pub fn group(channel_id: i64, title: impl Into<String>, invite_link: Option<String>) -> Self {
        let title = title.into();
        Self {
            kind: IdentityKind::Group,
            external_id: title.clone(),
            channel_id,
            display_names: vec![title],
            invite_link,
        }
    }

    /// Human-readable label: the first display name, or the external id.
    pub fn label(&self) -> &str {
        self.display_names
            .first()
            .map(String::as_str)
            .unwrap_or(&self.external_id)
    }
}

/// Key accepted by channel lookups: either index of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Name(String),
    ChannelId(i64),
}

impl LookupKey {
    /// Numeric text selects the channel-id index, anything else the name index.
    pub fn parse(key: &str) -> Self {
        match key.trim().parse::<i64>() {
            Ok(id) => Self::ChannelId(id),
            Err(_) => Self::Name(key.to_string()),
        }
    }
}

impl FromStr for LookupKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<i64> for LookupKey {
    fn from(id: i64) -> Self {
        Self::ChannelId(id)
    }
}

impl From<&str> for LookupKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::ChannelId(id) => write!(f, "{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_key_parses_numbers_as_channel_ids() {
        assert_eq!(LookupKey::parse("42"), LookupKey::ChannelId(42));
        assert_eq!(LookupKey::parse("-100123"), LookupKey::ChannelId(-100123));
        assert_eq!(LookupKey::parse("alice"), LookupKey::Name("alice".into()));
    }

    #[test]
    fn group_uses_title_as_external_id() {
        let g = ChannelIdentity::group(-5, "Ops", Some("https://t.me/+abc".into()));
        assert_eq!(g.external_id, "Ops");
        assert_eq!(g.label(), "Ops");
        assert_eq!(g.kind, IdentityKind::Group);
    }

    #[test]
    fn identity_serializes_camel_case() {
        let u = ChannelIdentity::user("bob", vec!["Bob B.".into()], 7);
        let json = serde_json::to_value(&u).unwrap();
        assert_eq!(json["externalId"], "bob");
        assert_eq!(json["channelId"], 7);
        assert_eq!(json["kind"], "user");
        assert!(json.get("inviteLink").is_none());
    }
}
