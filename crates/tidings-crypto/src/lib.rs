/// Tidings integrity primitives.
///
/// Everything that gets hashed goes through the same two steps: collapse
/// whitespace runs in the JSON text, then SHA-256 the UTF-8 bytes and render
/// the digest as `json:sha256:<hex>`. Entities carry that digest as their
/// `cryptoHash`; notification envelopes use it to link to their parent.

pub mod canonical;
pub mod chain;
pub mod entity;

pub use canonical::{ALGORITHM, GENESIS, canonicalize, digest, hash_json};
pub use chain::{envelope_hash, generate_nonce, seal_envelope, verify_chain, verify_envelope};
pub use entity::{DIGEST_FIELD, Digestible, entity_digest};
