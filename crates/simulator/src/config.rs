//! Simulation configuration.

use quorumsim_simulation::NetworkConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced before the core is ever started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level run configuration. Every field has a default, so a config
/// file only needs to name what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of validator nodes.
    pub num_nodes: usize,
    /// Transactions to generate and distribute.
    pub num_transactions: usize,
    /// Blocks to produce (one proposer rotation each).
    pub num_blocks: u64,
    /// Seconds of virtual time driven per block.
    pub simulation_duration: f64,
    /// Domain-separation string mixed into every signature.
    pub chain_id: String,
    /// Transport behavior.
    pub network: NetworkConfig,
    /// Where the event journal is written.
    pub log_file: PathBuf,
    /// Seed for the transport RNG and key derivation.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_nodes: 8,
            num_transactions: 5,
            num_blocks: 3,
            simulation_duration: 2.0,
            chain_id: "mainnet".to_string(),
            network: NetworkConfig::default(),
            log_file: PathBuf::from("logs/simulation.log"),
            seed: 42,
        }
    }
}

impl SimConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn stock_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.num_nodes, 8);
        assert_eq!(config.num_transactions, 5);
        assert_eq!(config.num_blocks, 3);
        assert_eq!(config.simulation_duration, 2.0);
        assert_eq!(config.chain_id, "mainnet");
        assert_eq!(config.network.min_delay, 0.01);
        assert_eq!(config.network.max_delay, 0.5);
        assert_eq!(config.network.drop_rate, 0.05);
        assert_eq!(config.network.duplicate_rate, 0.02);
        assert_eq!(config.network.rate_limit, 100);
        assert_eq!(config.log_file, PathBuf::from("logs/simulation.log"));
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"num_nodes": 5, "chain_id": "testnet", "network": {{"drop_rate": 0.2}}}}"#
        )
        .unwrap();

        let config = SimConfig::load(file.path()).unwrap();
        assert_eq!(config.num_nodes, 5);
        assert_eq!(config.chain_id, "testnet");
        assert_eq!(config.network.drop_rate, 0.2);
        // Everything unnamed keeps its default.
        assert_eq!(config.num_blocks, 3);
        assert_eq!(config.network.max_delay, 0.5);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            SimConfig::load("definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();
        assert!(matches!(
            SimConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
