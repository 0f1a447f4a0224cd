use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use tidings_types::{ChainVerification, NotificationEnvelope};

use crate::canonical::hash_json;

/// Per-envelope random token (32 lowercase hex chars).
pub fn generate_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Hash of an envelope computed over every field except `hash`.
pub fn envelope_hash(envelope: &NotificationEnvelope) -> serde_json::Result<String> {
    hash_json(&envelope.body())
}

/// Build an envelope following `parent_hash` and fill in its hash.
pub fn seal_envelope(
    messages: Vec<Value>,
    writer: &str,
    timestamp: DateTime<Utc>,
    nonce: String,
    parent_hash: &str,
) -> serde_json::Result<NotificationEnvelope> {
    let mut envelope = NotificationEnvelope {
        messages,
        writer: writer.to_string(),
        timestamp,
        nonce,
        parent_hash: parent_hash.to_string(),
        hash: String::new(),
    };
    envelope.hash = envelope_hash(&envelope)?;
    Ok(envelope)
}

/// True if the recorded hash matches the envelope contents.
pub fn verify_envelope(envelope: &NotificationEnvelope) -> bool {
    envelope_hash(envelope).is_ok_and(|h| h == envelope.hash)
}

/// Check each envelope's hash and that it follows its predecessor.
///
/// `anchor` is the hash the first envelope must follow (GENESIS for a
/// chain observed from its start).
pub fn verify_chain(envelopes: &[NotificationEnvelope], anchor: &str) -> ChainVerification {
    let mut expected_parent = anchor;
    for (index, envelope) in envelopes.iter().enumerate() {
        let computed = envelope_hash(envelope).unwrap_or_default();
        if computed != envelope.hash {
            return ChainVerification::HashMismatch {
                index,
                recorded: envelope.hash.clone(),
                computed,
            };
        }
        if envelope.parent_hash != expected_parent {
            return ChainVerification::ParentMismatch {
                index,
                expected: expected_parent.to_string(),
                found: envelope.parent_hash.clone(),
            };
        }
        expected_parent = &envelope.hash;
    }
    ChainVerification::Valid {
        length: envelopes.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::GENESIS;
    use serde_json::json;

    fn chain(batches: &[Vec<Value>]) -> Vec<NotificationEnvelope> {
        let mut parent = GENESIS.to_string();
        let mut out = Vec::new();
        for batch in batches {
            let env = seal_envelope(batch.clone(), "writer-1", Utc::now(), generate_nonce(), &parent).unwrap();
            parent = env.hash.clone();
            out.push(env);
        }
        out
    }

    #[test]
    fn hash_survives_a_wire_round_trip() {
        let env = seal_envelope(
            vec![json!({"event": "user.created", "id": 7}), json!("m2")],
            "writer-1",
            Utc::now(),
            generate_nonce(),
            GENESIS,
        )
        .unwrap();
        let text = serde_json::to_string_pretty(&env).unwrap();
        let back: NotificationEnvelope = serde_json::from_str(&text).unwrap();
        assert!(verify_envelope(&back));
        assert_eq!(envelope_hash(&back).unwrap(), env.hash);
    }

    #[test]
    fn tampered_message_is_detected() {
        let mut envs = chain(&[vec![json!("m1"), json!("m2")], vec![json!("m3")]]);
        let original = envs[0].hash.clone();
        envs[0].messages[1] = json!("m2-forged");
        assert_ne!(envelope_hash(&envs[0]).unwrap(), original);
        assert!(!verify_envelope(&envs[0]));
        assert!(matches!(
            verify_chain(&envs, GENESIS),
            ChainVerification::HashMismatch { index: 0, .. }
        ));
    }

    #[test]
    fn reordering_is_detected() {
        let mut envs = chain(&[vec![json!(1)], vec![json!(2)], vec![json!(3)]]);
        assert_eq!(verify_chain(&envs, GENESIS), ChainVerification::Valid { length: 3 });
        envs.swap(1, 2);
        assert!(matches!(
            verify_chain(&envs, GENESIS),
            ChainVerification::ParentMismatch { index: 1, .. }
        ));
    }

    #[test]
    fn missing_batch_is_detected() {
        let mut envs = chain(&[vec![json!(1)], vec![json!(2)], vec![json!(3)]]);
        envs.remove(1);
        assert!(!verify_chain(&envs, GENESIS).is_valid());
    }

    #[test]
    fn nonces_are_distinct_hex() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
