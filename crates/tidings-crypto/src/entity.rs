use serde::Serialize;
use serde_json::Value;

use crate::canonical::{canonicalize, digest};

/// Property name under which entities expose their digest.
pub const DIGEST_FIELD: &str = "cryptoHash";

/// Digest of a JSON object with its own digest property stripped.
///
/// Only the top-level `field` is removed; non-object values are hashed as is.
pub fn entity_digest(value: &Value, field: &str) -> String {
    let text = match value {
        Value::Object(map) if map.contains_key(field) => {
            let mut stripped = map.clone();
            stripped.remove(field);
            Value::Object(stripped).to_string()
        }
        other => other.to_string(),
    };
    digest(&canonicalize(&text))
}

/// A domain entity carrying an integrity tag over its own JSON form.
///
/// Implementors call [`Digestible::refresh_crypto_hash`] after every mutation.
pub trait Digestible: Serialize {
    fn crypto_hash(&self) -> &str;

    fn set_crypto_hash(&mut self, hash: String);

    /// Name of the serialized digest property.
    fn digest_field() -> &'static str {
        DIGEST_FIELD
    }

    fn compute_crypto_hash(&self) -> serde_json::Result<String> {
        let value = serde_json::to_value(self)?;
        Ok(entity_digest(&value, Self::digest_field()))
    }

    fn refresh_crypto_hash(&mut self) -> serde_json::Result<()> {
        let hash = self.compute_crypto_hash()?;
        self.set_crypto_hash(hash);
        Ok(())
    }

    fn verify_crypto_hash(&self) -> serde_json::Result<bool> {
        Ok(self.compute_crypto_hash()? == self.crypto_hash())
    }
}
