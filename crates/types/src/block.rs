//! Chained block container.

use crate::canonical::hash_data;
use crate::crypto::{KeyPair, Signature};
use crate::signing::{sign_payload, DOMAIN_HEADER};
use crate::state::{StateError, StateStore};
use crate::transaction::Transaction;
use serde_json::{json, Value};
use std::fmt;

/// Parent hash carried by the first block of the chain.
pub const GENESIS_PARENT: &str = "genesis";

/// Hex SHA-256 digest of a block, or the genesis sentinel.
pub type BlockHash = String;

/// A block: ordered transactions chained to a parent, committing to the
/// post-apply state.
///
/// The content hash covers `{height, parent_hash, tx_count, state_hash}`.
/// It intentionally does not cover individual transaction contents or the
/// proposer signature; the state commitment is what receivers re-derive
/// and compare.
#[derive(Debug, Clone)]
pub struct Block {
    pub height: u64,
    pub parent_hash: BlockHash,
    pub transactions: Vec<Transaction>,
    pub state_hash: String,
    pub proposer_signature: Option<Signature>,
    pub hash: BlockHash,
}

impl Block {
    /// Assemble a block from already-executed parts and derive its hash.
    pub fn new(
        height: u64,
        parent_hash: impl Into<BlockHash>,
        transactions: Vec<Transaction>,
        state_hash: impl Into<String>,
    ) -> Self {
        let parent_hash = parent_hash.into();
        let state_hash = state_hash.into();
        let hash = Self::compute_hash(height, &parent_hash, transactions.len(), &state_hash);
        Self {
            height,
            parent_hash,
            transactions,
            state_hash,
            proposer_signature: None,
            hash,
        }
    }

    /// Speculatively execute `transactions` against a snapshot of `state`
    /// and build the block over the resulting commitment. Fails if any
    /// transaction fails verification.
    pub fn build(
        height: u64,
        parent_hash: impl Into<BlockHash>,
        transactions: Vec<Transaction>,
        state: &StateStore,
    ) -> Result<Self, StateError> {
        let mut speculative = state.clone();
        for tx in &transactions {
            speculative.apply_transaction(tx)?;
        }
        Ok(Self::new(
            height,
            parent_hash,
            transactions,
            speculative.commitment(),
        ))
    }

    fn compute_hash(height: u64, parent_hash: &str, tx_count: usize, state_hash: &str) -> BlockHash {
        hash_data(&json!({
            "height": height,
            "parent_hash": parent_hash,
            "tx_count": tx_count,
            "state_hash": state_hash,
        }))
    }

    /// Header fields covered by the proposer signature.
    pub fn header_payload(&self) -> Value {
        json!({
            "height": self.height,
            "parent_hash": self.parent_hash,
            "state_hash": self.state_hash,
        })
    }

    /// Sign the header in the `HEADER` domain.
    pub fn sign_header(&mut self, keypair: &KeyPair, chain_id: &str) {
        self.proposer_signature = Some(sign_payload(
            keypair,
            DOMAIN_HEADER,
            chain_id,
            &self.header_payload(),
        ));
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block(h={}, hash={}..., {} txs)",
            self.height,
            &self.hash[..8],
            self.transactions.len()
        )
    }
}
