//! The tick-loop orchestrator.

use crate::config::SimConfig;
use quorumsim_node::ValidatorNode;
use quorumsim_simulation::{JournalError, NetSim, NetworkStats};
use quorumsim_types::{KeyPair, NodeId, Transaction, ValidatorSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tick quantum used by the block loop.
const TICK: Duration = Duration::from_millis(50);

/// Bounded catch-up rounds after the block loop.
const SETTLE_ROUNDS: usize = 4;

/// Outcome of a run, read back by the CLI for reporting and exit status.
#[derive(Debug)]
pub struct SimulationReport {
    /// The height every node was asked to reach.
    pub target_height: u64,
    pub heights: BTreeMap<NodeId, u64>,
    pub commitments: BTreeMap<NodeId, String>,
    pub distinct_commitments: usize,
    pub journal_hash: String,
    pub stats: NetworkStats,
}

impl SimulationReport {
    /// True iff every node reached the target height with one shared
    /// state commitment. This is the exit-code criterion.
    pub fn all_agree(&self) -> bool {
        self.distinct_commitments == 1
            && self
                .heights
                .values()
                .all(|height| *height == self.target_height)
    }
}

/// A fully wired simulation: nodes registered with the transport, keys
/// derived from the seed, ready to run.
pub struct Simulation {
    config: SimConfig,
    network: NetSim,
    node_ids: Vec<NodeId>,
    rng: ChaCha8Rng,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        let mut network = NetSim::new(config.network.clone(), config.seed);
        // Key derivation shares the seed but not the transport's RNG
        // stream, so fault sampling stays independent of node count.
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(1));

        let node_ids: Vec<NodeId> = (0..config.num_nodes)
            .map(|i| NodeId::new(format!("node{i}")))
            .collect();
        let validators = ValidatorSet::new(node_ids.iter().cloned());

        for id in &node_ids {
            let mut node =
                ValidatorNode::new(id.clone(), true, &config.chain_id, KeyPair::generate(&mut rng));
            node.set_validators(validators.clone());
            network.register_node(node);
        }

        info!(
            num_nodes = config.num_nodes,
            num_blocks = config.num_blocks,
            seed = config.seed,
            chain_id = %config.chain_id,
            "created simulation"
        );

        Self {
            config,
            network,
            node_ids,
            rng,
        }
    }

    pub fn network(&self) -> &NetSim {
        &self.network
    }

    /// Drive the configured number of blocks, settle stragglers, verify,
    /// and write the journal.
    pub fn run(&mut self) -> Result<SimulationReport, JournalError> {
        self.generate_transactions();

        for block_index in 0..self.config.num_blocks {
            let height = block_index + 1;
            let proposer = self.node_ids[block_index as usize % self.node_ids.len()].clone();
            let queued = self
                .network
                .node(&proposer)
                .map(|node| node.pending_transactions().len())
                .unwrap_or(0);

            info!(height, proposer = %proposer, queued, "starting block round");
            self.journal_event(
                "block_proposed",
                json!({
                    "height": height,
                    "proposer": proposer,
                    "num_txs": queued,
                }),
            );

            let now = self.network.now();
            let actions = match self.network.node_mut(&proposer) {
                Some(node) => {
                    node.set_time(now);
                    node.propose_block()
                }
                None => vec![],
            };
            self.network.execute(&proposer, actions);

            let ticks = (self.config.simulation_duration / TICK.as_secs_f64()).ceil() as u64;
            for _ in 0..ticks {
                self.network.step(TICK);
            }

            let finalized = self.count_at_height(height);
            info!(height, finalized, total = self.node_ids.len(), "block round complete");
            self.journal_event(
                "block_finalized",
                json!({
                    "height": height,
                    "finalized_nodes": finalized,
                    "total_nodes": self.node_ids.len(),
                }),
            );
        }

        self.settle();

        let report = self.report();
        self.network.journal().save(&self.config.log_file)?;
        info!(
            log_file = %self.config.log_file.display(),
            journal_hash = %report.journal_hash,
            "saved journal"
        );
        Ok(report)
    }

    /// Create `num_transactions` signed writes (`user{i}/balance`) and
    /// hand them round-robin to the nodes.
    fn generate_transactions(&mut self) {
        for i in 0..self.config.num_transactions {
            let keypair = KeyPair::generate(&mut self.rng);
            let sender = format!("user{i}");
            let key = format!("user{i}/balance");
            let value = ((i + 1) * 100).to_string();
            let tx = Transaction::signed(&sender, &key, &value, &keypair, &self.config.chain_id);

            self.journal_event(
                "transaction_created",
                json!({
                    "tx_id": i,
                    "sender": sender,
                    "key": key,
                    "value": value,
                }),
            );

            let target = self.node_ids[i % self.node_ids.len()].clone();
            let accepted = self
                .network
                .node_mut(&target)
                .map(|node| node.submit_transaction(tx))
                .unwrap_or(false);
            if !accepted {
                warn!(tx_id = i, node = %target, "transaction rejected at submission");
            }
        }
    }

    /// Bounded catch-up: nodes behind the chain tip ask a caught-up peer
    /// to re-announce the next block they need.
    fn settle(&mut self) {
        for round in 0..SETTLE_ROUNDS {
            let Some(target) = self.heights().values().max().copied() else {
                return;
            };
            let lagging: Vec<NodeId> = self
                .node_ids
                .iter()
                .filter(|id| self.height_of(id) < target)
                .cloned()
                .collect();
            if lagging.is_empty() {
                return;
            }
            let Some(source) = self
                .node_ids
                .iter()
                .find(|id| self.height_of(id) == target)
                .cloned()
            else {
                return;
            };

            debug!(round, lagging = lagging.len(), target, "running catch-up round");
            let now = self.network.now();
            for id in lagging {
                let actions = match self.network.node_mut(&id) {
                    Some(node) => {
                        node.set_time(now);
                        node.request_block_from(&source)
                    }
                    None => vec![],
                };
                self.network.execute(&id, actions);
            }
            self.network.step(Duration::from_secs(1));
        }
    }

    fn report(&self) -> SimulationReport {
        let heights = self.heights();
        let commitments: BTreeMap<NodeId, String> = self
            .network
            .nodes()
            .map(|node| (node.node_id().clone(), node.state_commitment()))
            .collect();

        let mut distinct: Vec<&String> = commitments.values().collect();
        distinct.sort();
        distinct.dedup();

        SimulationReport {
            target_height: self.config.num_blocks,
            heights,
            distinct_commitments: distinct.len(),
            commitments,
            journal_hash: self.network.journal().content_hash(),
            stats: self.network.stats().clone(),
        }
    }

    fn heights(&self) -> BTreeMap<NodeId, u64> {
        self.network
            .nodes()
            .map(|node| (node.node_id().clone(), node.current_height()))
            .collect()
    }

    fn height_of(&self, id: &NodeId) -> u64 {
        self.network
            .node(id)
            .map(|node| node.current_height())
            .unwrap_or(0)
    }

    fn count_at_height(&self, height: u64) -> usize {
        self.network
            .nodes()
            .filter(|node| node.current_height() >= height)
            .count()
    }

    fn journal_event(&mut self, kind: &str, data: serde_json::Value) {
        let now = self.network.now().as_secs_f64();
        self.network.journal_mut().append(now, kind, data);
    }
}
