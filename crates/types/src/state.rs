//! Replicated key/value state with a canonical commitment.

use crate::canonical::hash_data;
use crate::transaction::Transaction;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors from applying a transaction to state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
}

/// The key/value store replicated by consensus.
///
/// Cloning is the snapshot primitive: speculative execution clones the
/// store, applies transactions to the clone, and reads its commitment
/// without touching the live copy.
#[derive(Debug, Clone)]
pub struct StateStore {
    chain_id: String,
    data: BTreeMap<String, String>,
}

impl StateStore {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Apply a verified transaction; rejects anything that fails
    /// [`Transaction::verify`] for this store's chain.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<(), StateError> {
        if !tx.verify(&self.chain_id) {
            return Err(StateError::InvalidTransaction(tx.to_string()));
        }
        self.data.insert(tx.key.clone(), tx.value.clone());
        Ok(())
    }

    /// Hex SHA-256 over the canonical encoding of the key-sorted
    /// `[key, value]` pair list.
    pub fn commitment(&self) -> String {
        let pairs: Vec<Value> = self.data.iter().map(|(k, v)| json!([k, v])).collect();
        hash_data(&Value::Array(pairs))
    }
}

impl fmt::Display for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "State({} entries, hash={}...)",
            self.data.len(),
            &self.commitment()[..8]
        )
    }
}
