//! Core types for quorumsim consensus.
//!
//! This crate provides the foundational types used throughout the
//! simulator:
//!
//! - **Canonical encoding**: sorted-key compact JSON and SHA-256 digests
//! - **Cryptography**: Ed25519 key pairs with domain-separated signing
//! - **Data model**: [`Transaction`], [`StateStore`], [`Block`], [`Vote`]
//! - **Membership**: [`NodeId`] and the static [`ValidatorSet`]
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crate, making it the foundation layer. Every hash and every signature in
//! the system is computed over the canonical encoding defined here, so two
//! replicas that hold the same logical state always produce byte-identical
//! commitments.

mod block;
mod canonical;
mod crypto;
mod signing;
mod state;
mod transaction;
mod validator;
mod vote;

pub use block::{Block, BlockHash, GENESIS_PARENT};
pub use canonical::{canonical_json, hash_bytes, hash_data};
pub use crypto::{KeyPair, PublicKey, Signature, PUBLIC_KEY_LEN, SIGNATURE_LEN};
pub use signing::{
    sign_payload, signing_message, verify_payload, DOMAIN_HEADER, DOMAIN_TX, DOMAIN_VOTE,
};
pub use state::{StateError, StateStore};
pub use transaction::Transaction;
pub use validator::{NodeId, ValidatorSet};
pub use vote::{Vote, VotePhase};
