//! Ed25519 key material.
//!
//! Keys are generated per node at construction time and never leave the
//! process; public keys travel alongside every signature on the wire.

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand_core::CryptoRngCore;
use std::fmt;

/// Length of a raw Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of a raw Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// An Ed25519 signing key together with its public half.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the given RNG.
    ///
    /// The orchestrator passes a seeded RNG here so key generation is
    /// reproducible across runs.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        Self {
            signing: SigningKey::generate(rng),
        }
    }

    /// Derive a key pair from a fixed 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// The public half of this key pair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Sign raw message bytes.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", &self.public_key().to_hex()[..8])
    }
}

/// Raw Ed25519 public key bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Verify a signature over `message`. Malformed keys verify as false.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig).is_ok()
    }

    /// Hex encoding of the key bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..8])
    }
}

/// Raw Ed25519 signature bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &hex::encode(self.0)[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let keypair = KeyPair::from_seed([7u8; 32]);
        let signature = keypair.sign(b"hello");
        assert!(keypair.public_key().verify(b"hello", &signature));
    }

    #[test]
    fn tampered_message_fails() {
        let keypair = KeyPair::from_seed([7u8; 32]);
        let signature = keypair.sign(b"hello");
        assert!(!keypair.public_key().verify(b"hellO", &signature));
    }

    #[test]
    fn wrong_key_fails() {
        let signer = KeyPair::from_seed([1u8; 32]);
        let other = KeyPair::from_seed([2u8; 32]);
        let signature = signer.sign(b"payload");
        assert!(!other.public_key().verify(b"payload", &signature));
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        use rand::SeedableRng;
        use rand_chacha::ChaCha8Rng;

        let a = KeyPair::generate(&mut ChaCha8Rng::seed_from_u64(99));
        let b = KeyPair::generate(&mut ChaCha8Rng::seed_from_u64(99));
        assert_eq!(a.public_key(), b.public_key());
    }
}
