//! Domain-separated signing envelope.
//!
//! Every signature in the system covers bytes of the form
//! `"{DOMAIN}:{chain_id}:{canonical_json(payload)}"`. The domain tag keeps
//! a transaction signature, a header signature, and a vote signature
//! mutually unverifiable even over identical payloads; the chain id keeps
//! signatures from one network invalid on another.

use crate::canonical::canonical_json;
use crate::crypto::{KeyPair, PublicKey, Signature};
use serde_json::Value;

/// Domain tag for transaction signatures.
pub const DOMAIN_TX: &str = "TX";

/// Domain tag for block header signatures.
pub const DOMAIN_HEADER: &str = "HEADER";

/// Domain tag for prevote/precommit signatures.
pub const DOMAIN_VOTE: &str = "VOTE";

/// The exact bytes covered by a signature in the given domain.
pub fn signing_message(domain: &str, chain_id: &str, payload: &Value) -> Vec<u8> {
    format!("{}:{}:{}", domain, chain_id, canonical_json(payload)).into_bytes()
}

/// Sign `payload` in `domain` for `chain_id`.
pub fn sign_payload(keypair: &KeyPair, domain: &str, chain_id: &str, payload: &Value) -> Signature {
    keypair.sign(&signing_message(domain, chain_id, payload))
}

/// Verify a signature made by [`sign_payload`]. Failure means the caller
/// treats the artifact as absent.
pub fn verify_payload(
    public_key: &PublicKey,
    domain: &str,
    chain_id: &str,
    payload: &Value,
    signature: &Signature,
) -> bool {
    public_key.verify(&signing_message(domain, chain_id, payload), signature)
}
