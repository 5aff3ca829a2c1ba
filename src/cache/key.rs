//! Key Derivation
//!
//! Physical keys embed a hash of the tag set, so the same logical key written
//! under different tags lands in different slots.

use sha2::{Digest, Sha256};

/// Hex characters of the tag hash appended to a physical key.
const TAG_HASH_LEN: usize = 8;

/// Hex-encoded SHA-256 of `input`.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

// == Generate Key ==
/// Derives the namespaced physical key for `key` under `tags`.
///
/// Tags are sorted before hashing so their order at the call site does not
/// matter.
pub fn generate_key(prefix: &str, key: &str, tags: &[String]) -> String {
    let key_hash = sha256_hex(key);
    if tags.is_empty() {
        return format!("{prefix}{key_hash}");
    }

    let mut sorted: Vec<&str> = tags.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let tag_hash = sha256_hex(&sorted.join(":"));
    format!("{prefix}{key_hash}:{}", &tag_hash[..TAG_HASH_LEN])
}
