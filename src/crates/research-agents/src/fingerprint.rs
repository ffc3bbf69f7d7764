//! Query normalization and cache-key fingerprinting.

use sha2::{Digest, Sha256};

/// `normalize = trim().casefold()`. Deliberately simple: no stemming or
/// punctuation stripping, so the same fingerprint results regardless of
/// case or surrounding whitespace, exactly rather than approximately.
pub fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

pub fn fingerprint(query: &str) -> String {
    let normalized = normalize(query);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}
