use serde::Serialize;
use sha2::{Digest, Sha256};

/// Algorithm tag embedded in every digest string.
pub const ALGORITHM: &str = "sha256";

/// Parent hash of the first envelope in a chain.
pub const GENESIS: &str =
    "json:sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// Collapse every run of whitespace into a single ASCII space.
///
/// Keys are not re-sorted: callers must serialize with a fixed key order.
pub fn canonicalize(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_whitespace = false;
    for c in json.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
                in_whitespace = true;
            }
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

/// SHA-256 over the UTF-8 bytes of `text`, rendered as `json:sha256:<hex>`.
pub fn digest(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    format!("json:{}:{}", ALGORITHM, hex::encode(hash))
}

/// Serialize, canonicalize and digest in one go.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let text = serde_json::to_string(value)?;
    Ok(digest(&canonicalize(&text)))
}
