use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One hash-chained batch of outbound notification payloads.
///
/// Field order is part of the wire format: verifiers recompute `hash` over
/// the serialization of every field that precedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    pub messages: Vec<Value>,
    pub writer: String,
    pub timestamp: DateTime<Utc>,
    pub nonce: String,
    pub parent_hash: String,
    pub hash: String,
}

/// The hashed portion of an envelope: everything except `hash`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeBody<'a> {
    pub messages: &'a [Value],
    pub writer: &'a str,
    pub timestamp: &'a DateTime<Utc>,
    pub nonce: &'a str,
    pub parent_hash: &'a str,
}

impl NotificationEnvelope {
    pub fn body(&self) -> EnvelopeBody<'_> {
        EnvelopeBody {
            messages: &self.messages,
            writer: &self.writer,
            timestamp: &self.timestamp,
            nonce: &self.nonce,
            parent_hash: &self.parent_hash,
        }
    }
}
