//! Canonical JSON encoding and SHA-256 digests.
//!
//! Signatures and hashes are always computed over the same canonical form:
//! object keys sorted lexicographically, compact separators, UTF-8 bytes.
//! `serde_json`'s default map is ordered, so serializing a [`Value`]
//! already yields sorted keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value canonically: sorted keys, no whitespace.
pub fn canonical_json(value: &Value) -> String {
    // A Value has string keys only; serialization cannot fail.
    serde_json::to_string(value).expect("canonical JSON serialization")
}

/// Hex-encoded SHA-256 over raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 over the canonical encoding of a JSON value.
pub fn hash_data(value: &Value) -> String {
    hash_bytes(canonical_json(value).as_bytes())
}
