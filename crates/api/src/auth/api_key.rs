//! Static bearer key used by the workflow runner.
//!
//! Only the SHA-256 digest of the configured key is kept in memory; incoming
//! keys are hashed and compared digest to digest.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of an API key.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether `presented` matches the key whose digest is `expected_hash`.
pub fn verify_api_key(presented: &str, expected_hash: &str) -> bool {
    let presented = hash_api_key(presented);
    // Equal-length hex digests; compare every byte.
    presented
        .bytes()
        .zip(expected_hash.bytes())
        .fold(presented.len() == expected_hash.len(), |eq, (a, b)| eq & (a == b))
}
