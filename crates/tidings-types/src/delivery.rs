use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of handing one envelope to one destination on one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { reason: String },
    /// The destination key did not resolve to any known identity.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub channel: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }
}

/// Per-destination outcomes of dispatching a single envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub envelope_hash: String,
    pub message_count: usize,
    pub dispatched_at: DateTime<Utc>,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, DeliveryStatus::Failed { .. }))
            .count()
    }

    pub fn unresolved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Unresolved)
            .count()
    }
}

/// Outcome of checking a sequence of envelopes for chain integrity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ChainVerification {
    Valid { length: usize },
    /// The recorded hash does not match the recomputed one.
    HashMismatch { index: usize, recorded: String, computed: String },
    /// The envelope does not follow the hash of its predecessor.
    ParentMismatch { index: usize, expected: String, found: String },
}

impl ChainVerification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}
