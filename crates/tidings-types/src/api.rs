use serde::{Deserialize, Serialize};

use crate::delivery::ChainVerification;
use crate::envelope::NotificationEnvelope;

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub pending: usize,
}

// -- Chain --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatus {
    pub writer: String,
    pub head: String,
    pub pending: usize,
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyChainRequest {
    pub envelopes: Vec<NotificationEnvelope>,
    /// Hash the first envelope must follow. Defaults to the genesis value.
    #[serde(default)]
    pub anchor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyChainResponse {
    #[serde(flatten)]
    pub verification: ChainVerification,
}

// -- Channels --

#[derive(Debug, Serialize, Deserialize)]
pub struct CompactResponse {
    /// Records left in the log after compaction.
    pub records: usize,
}

// -- Bot webhook --

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateResponse {
    /// Number of identity records that changed.
    pub changed: usize,
}
