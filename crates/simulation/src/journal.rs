//! Deterministic run journal.

use quorumsim_types::hash_bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors from persisting or restoring a journal.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One journal entry. Field order is alphabetical so the derived
/// serialization matches the canonical (sorted-keys) encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub data: Value,
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Append-only structured event record with a content hash.
///
/// Timestamps come from the virtual clock only — the host clock is never
/// read — so two runs with the same seed write byte-identical journals.
#[derive(Debug, Default)]
pub struct EventLog {
    records: Vec<LogRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `{timestamp, type, data}` record.
    pub fn append(&mut self, timestamp: f64, kind: impl Into<String>, data: Value) {
        self.records.push(LogRecord {
            data,
            timestamp,
            kind: kind.into(),
        });
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The canonical encoding: a JSON array in insertion order, sorted
    /// keys, compact separators. [`Self::save`] writes exactly these bytes
    /// and [`Self::content_hash`] hashes exactly these bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Records contain only string keys and finite numbers.
        serde_json::to_vec(&self.records).expect("journal serialization")
    }

    /// Hex SHA-256 over the canonical encoding.
    pub fn content_hash(&self) -> String {
        hash_bytes(&self.canonical_bytes())
    }

    /// Write the canonical encoding, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), JournalError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.canonical_bytes())?;
        Ok(())
    }

    /// Restore a journal previously written by [`Self::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let content = fs::read(path)?;
        let records: Vec<LogRecord> = serde_json::from_slice(&content)?;
        Ok(Self { records })
    }
}
