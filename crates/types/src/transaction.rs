//! Authenticated key/value updates.

use crate::crypto::{KeyPair, PublicKey, Signature};
use crate::signing::{sign_payload, verify_payload, DOMAIN_TX};
use serde_json::{json, Value};
use std::fmt;

/// A signed write of `value` under `key`, authorized by `sender`.
///
/// The key must live in the sender's namespace (`"{sender}/"` prefix) and
/// the signature covers `{sender, key, value}` in the `TX` domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub sender: String,
    pub key: String,
    pub value: String,
    pub signature: Option<Signature>,
    pub public_key: Option<PublicKey>,
}

impl Transaction {
    /// An unsigned transaction. Fails verification until signed.
    pub fn new(
        sender: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            key: key.into(),
            value: value.into(),
            signature: None,
            public_key: None,
        }
    }

    /// Build and sign a transaction in one step.
    pub fn signed(
        sender: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        keypair: &KeyPair,
        chain_id: &str,
    ) -> Self {
        let mut tx = Self::new(sender, key, value);
        tx.signature = Some(sign_payload(keypair, DOMAIN_TX, chain_id, &tx.payload()));
        tx.public_key = Some(keypair.public_key());
        tx
    }

    /// The signed fields. The signature itself is never part of the payload.
    pub fn payload(&self) -> Value {
        json!({
            "sender": self.sender,
            "key": self.key,
            "value": self.value,
        })
    }

    /// Check authorization and signature for the given chain.
    ///
    /// True iff signature and public key are present, the key starts with
    /// `"{sender}/"`, and the signature verifies in the `TX` domain.
    pub fn verify(&self, chain_id: &str) -> bool {
        let (Some(signature), Some(public_key)) = (&self.signature, &self.public_key) else {
            return false;
        };
        if !self.key.starts_with(&format!("{}/", self.sender)) {
            return false;
        }
        verify_payload(public_key, DOMAIN_TX, chain_id, &self.payload(), signature)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tx({}: {}={})", self.sender, self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN: &str = "mainnet";

    #[test]
    fn signed_transaction_verifies() {
        let keypair = KeyPair::from_seed([11u8; 32]);
        let tx = Transaction::signed("alice", "alice/balance", "100", &keypair, CHAIN);
        assert!(tx.verify(CHAIN));
    }

    #[test]
    fn unsigned_transaction_fails() {
        let tx = Transaction::new("alice", "alice/balance", "100");
        assert!(!tx.verify(CHAIN));
    }

    #[test]
    fn foreign_namespace_fails() {
        let keypair = KeyPair::from_seed([11u8; 32]);
        // Well-signed, but writing outside the sender's prefix.
        let tx = Transaction::signed("alice", "bob/balance", "100", &keypair, CHAIN);
        assert!(!tx.verify(CHAIN));
    }

    #[test]
    fn prefix_must_include_separator() {
        let keypair = KeyPair::from_seed([11u8; 32]);
        // "alicex/..." must not satisfy the "alice/" rule.
        let tx = Transaction::signed("alice", "alicex/balance", "100", &keypair, CHAIN);
        assert!(!tx.verify(CHAIN));
    }

    #[test]
    fn mismatched_public_key_fails() {
        let signer = KeyPair::from_seed([1u8; 32]);
        let other = KeyPair::from_seed([2u8; 32]);
        let mut tx = Transaction::signed("alice", "alice/balance", "100", &signer, CHAIN);
        tx.public_key = Some(other.public_key());
        assert!(!tx.verify(CHAIN));
    }

    #[test]
    fn chain_id_is_bound() {
        let keypair = KeyPair::from_seed([11u8; 32]);
        let tx = Transaction::signed("alice", "alice/balance", "100", &keypair, "testnet");
        assert!(tx.verify("testnet"));
        assert!(!tx.verify(CHAIN));
    }

    #[test]
    fn tampered_value_fails() {
        let keypair = KeyPair::from_seed([11u8; 32]);
        let mut tx = Transaction::signed("alice", "alice/balance", "100", &keypair, CHAIN);
        tx.value = "999".to_string();
        assert!(!tx.verify(CHAIN));
    }
}
