/// Durable log line codec.
///
/// One upsert per line, fields joined by the ASCII unit separator (0x1F):
///
/// ```text
/// UpsertUser  <US> external_id <US> display_name... <US> channel_id
/// UpsertGroup <US> channel_id  <US> title <US> invite_link
/// ```
///
/// An empty invite link means "none". Lines starting with `//` or `#` are
/// comments.

use thiserror::Error;

use tidings_types::{ChannelIdentity, IdentityKind};

pub const FIELD_SEPARATOR: char = '\u{1F}';

const UPSERT_USER: &str = "UpsertUser";
const UPSERT_GROUP: &str = "UpsertGroup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    UpsertUser {
        external_id: String,
        display_names: Vec<String>,
        channel_id: i64,
    },
    UpsertGroup {
        channel_id: i64,
        title: String,
        invite_link: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryParseError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("{operation} with {fields} fields")]
    WrongArity { operation: &'static str, fields: usize },

    #[error("non-numeric channel id '{0}'")]
    InvalidChannelId(String),

    #[error("empty key field")]
    EmptyKey,
}

impl LogEntry {
    pub fn from_identity(identity: &ChannelIdentity) -> Self {
        match identity.kind {
            IdentityKind::User => Self::UpsertUser {
                external_id: identity.external_id.clone(),
                display_names: identity.display_names.clone(),
                channel_id: identity.channel_id,
            },
            IdentityKind::Group => Self::UpsertGroup {
                channel_id: identity.channel_id,
                title: identity.external_id.clone(),
                invite_link: identity.invite_link.clone(),
            },
        }
    }

    pub fn into_identity(self) -> ChannelIdentity {
        match self {
            Self::UpsertUser {
                external_id,
                display_names,
                channel_id,
            } => ChannelIdentity::user(external_id, display_names, channel_id),
            Self::UpsertGroup {
                channel_id,
                title,
                invite_link,
            } => ChannelIdentity::group(channel_id, title, invite_link),
        }
    }

    /// Render as one log line, without the terminator.
    pub fn encode(&self) -> String {
        let mut fields: Vec<String> = Vec::new();
        match self {
            Self::UpsertUser {
                external_id,
                display_names,
                channel_id,
            } => {
                fields.push(UPSERT_USER.to_string());
                fields.push(external_id.clone());
                fields.extend(display_names.iter().cloned());
                fields.push(channel_id.to_string());
            }
            Self::UpsertGroup {
                channel_id,
                title,
                invite_link,
            } => {
                fields.push(UPSERT_GROUP.to_string());
                fields.push(channel_id.to_string());
                fields.push(title.clone());
                fields.push(invite_link.clone().unwrap_or_default());
            }
        }
        fields.join(&FIELD_SEPARATOR.to_string())
    }

    /// Parse one line. Blank lines and comments yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, EntryParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('#') {
            return Ok(None);
        }

        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        match fields[0].trim() {
            UPSERT_USER => {
                if fields.len() < 3 {
                    return Err(EntryParseError::WrongArity {
                        operation: UPSERT_USER,
                        fields: fields.len(),
                    });
                }
                let external_id = fields[1];
                if external_id.is_empty() {
                    return Err(EntryParseError::EmptyKey);
                }
                let last = fields.len() - 1;
                let channel_id = parse_channel_id(fields[last])?;
                Ok(Some(Self::UpsertUser {
                    external_id: external_id.to_string(),
                    display_names: fields[2..last].iter().map(|s| s.to_string()).collect(),
                    channel_id,
                }))
            }
            UPSERT_GROUP => {
                if fields.len() != 4 {
                    return Err(EntryParseError::WrongArity {
                        operation: UPSERT_GROUP,
                        fields: fields.len(),
                    });
                }
                let channel_id = parse_channel_id(fields[1])?;
                if fields[2].is_empty() {
                    return Err(EntryParseError::EmptyKey);
                }
                let invite_link = Some(fields[3]).filter(|s| !s.is_empty()).map(str::to_string);
                Ok(Some(Self::UpsertGroup {
                    channel_id,
                    title: fields[2].to_string(),
                    invite_link,
                }))
            }
            other => Err(EntryParseError::UnknownOperation(other.to_string())),
        }
    }
}

fn parse_channel_id(raw: &str) -> Result<i64, EntryParseError> {
    raw.trim()
        .parse()
        .map_err(|_| EntryParseError::InvalidChannelId(raw.to_string()))
}

/// Replace characters that would break the line format with a space.
pub(crate) fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == FIELD_SEPARATOR || c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}
