//! End-to-end consensus scenarios over the simulated transport.
//!
//! These drive full validator sets through propose → prevote → precommit →
//! finalize, entirely synchronously over virtual time. Same seed, same
//! outcome, every run.

use quorumsim_node::ValidatorNode;
use quorumsim_simulation::{NetSim, NetworkConfig};
use quorumsim_types::{KeyPair, NodeId, Transaction, ValidatorSet};
use std::time::Duration;
use tracing_test::traced_test;

const CHAIN: &str = "mainnet";

fn lossless_config() -> NetworkConfig {
    NetworkConfig {
        min_delay: 0.01,
        max_delay: 0.05,
        drop_rate: 0.0,
        duplicate_rate: 0.0,
        rate_limit: 1000,
    }
}

fn node_id(i: usize) -> NodeId {
    NodeId::new(format!("node{i}"))
}

/// Build a network of `n` validators with deterministic keys.
fn build_network(config: NetworkConfig, n: usize, seed: u64) -> NetSim {
    let mut sim = NetSim::new(config, seed);
    let validators = ValidatorSet::new((0..n).map(node_id));
    for i in 0..n {
        let mut node = ValidatorNode::new(
            node_id(i),
            true,
            CHAIN,
            KeyPair::from_seed([seed as u8 ^ (i as u8 + 1); 32]),
        );
        node.set_validators(validators.clone());
        sim.register_node(node);
    }
    sim
}

fn propose_from(sim: &mut NetSim, proposer: &NodeId) {
    let now = sim.now();
    let actions = {
        let node = sim.node_mut(proposer).unwrap();
        node.set_time(now);
        node.propose_block()
    };
    sim.execute(proposer, actions);
}

fn run_ticks(sim: &mut NetSim, ticks: usize, tick: Duration) {
    for _ in 0..ticks {
        sim.step(tick);
    }
}

fn heights(sim: &NetSim) -> Vec<u64> {
    sim.nodes().map(|n| n.current_height()).collect()
}

fn distinct_commitments(sim: &NetSim) -> usize {
    let mut hashes: Vec<String> = sim.nodes().map(|n| n.state_commitment()).collect();
    hashes.sort();
    hashes.dedup();
    hashes.len()
}

/// Five validators, a clean network, one transaction: every node finalizes
/// height 1 with the same state.
#[traced_test]
#[test]
fn single_block_reaches_every_node() {
    let mut sim = build_network(lossless_config(), 5, 42);

    let keypair = KeyPair::from_seed([1u8; 32]);
    let tx = Transaction::signed("alice", "alice/balance", "100", &keypair, CHAIN);
    assert!(sim.node_mut(&node_id(0)).unwrap().submit_transaction(tx));

    propose_from(&mut sim, &node_id(0));
    run_ticks(&mut sim, 40, Duration::from_millis(50));

    assert_eq!(heights(&sim), vec![1; 5]);
    assert_eq!(distinct_commitments(&sim), 1);
    for node in sim.nodes() {
        assert_eq!(node.state().get("alice/balance"), Some("100"));
        assert_eq!(node.ledger().len(), 1);
        assert_eq!(node.ledger()[0].parent_hash, "genesis");
    }
}

/// Eight validators, three blocks proposed round-robin: the chain links up
/// and all replicas agree at height 3.
#[test]
fn three_blocks_round_robin() {
    let n = 8;
    let mut sim = build_network(lossless_config(), n, 7);

    for k in 0..3usize {
        let keypair = KeyPair::from_seed([30 + k as u8; 32]);
        let tx = Transaction::signed(
            format!("user{k}"),
            format!("user{k}/message"),
            format!("hello_{k}"),
            &keypair,
            CHAIN,
        );
        assert!(sim.node_mut(&node_id(k)).unwrap().submit_transaction(tx));
    }

    for k in 0..3usize {
        propose_from(&mut sim, &node_id(k));
        run_ticks(&mut sim, 40, Duration::from_millis(50));
    }

    assert_eq!(heights(&sim), vec![3; n]);
    assert_eq!(distinct_commitments(&sim), 1);
    for node in sim.nodes() {
        for k in 0..3usize {
            assert_eq!(
                node.state().get(&format!("user{k}/message")),
                Some(format!("hello_{k}").as_str())
            );
        }
        // Ledger chaining: every parent link matches the previous hash.
        let ledger = node.ledger();
        assert_eq!(ledger[0].parent_hash, "genesis");
        for i in 1..ledger.len() {
            assert_eq!(ledger[i].parent_hash, ledger[i - 1].hash);
        }
    }
}

/// A lossy, duplicating network: a majority still finalizes, and every
/// node that finalized agrees on the block and the state.
#[test]
fn lossy_network_preserves_safety() {
    let n = 8;
    let config = NetworkConfig {
        min_delay: 0.01,
        max_delay: 0.2,
        drop_rate: 0.1,
        duplicate_rate: 0.05,
        rate_limit: 1000,
    };
    let mut sim = build_network(config, n, 99);

    let keypair = KeyPair::from_seed([2u8; 32]);
    let tx = Transaction::signed("alice", "alice/balance", "100", &keypair, CHAIN);
    assert!(sim.node_mut(&node_id(0)).unwrap().submit_transaction(tx));

    propose_from(&mut sim, &node_id(0));
    run_ticks(&mut sim, 50, Duration::from_millis(100));

    // Orchestrator-style catch-up: lagging nodes ask a finalized peer to
    // re-announce the block they missed.
    for _ in 0..3 {
        let ids = sim.node_ids();
        let Some(source) = ids
            .iter()
            .find(|id| sim.node(id).unwrap().current_height() >= 1)
            .cloned()
        else {
            break;
        };
        let lagging: Vec<NodeId> = ids
            .into_iter()
            .filter(|id| sim.node(id).unwrap().current_height() == 0)
            .collect();
        if lagging.is_empty() {
            break;
        }
        for id in lagging {
            let actions = sim.node_mut(&id).unwrap().request_block_from(&source);
            sim.execute(&id, actions);
        }
        run_ticks(&mut sim, 10, Duration::from_millis(100));
    }

    let finalized: Vec<&ValidatorNode> = sim.nodes().filter(|n| n.current_height() >= 1).collect();
    assert!(
        finalized.len() * 2 > n,
        "a majority should finalize despite losses, got {}/{n}",
        finalized.len()
    );

    // Safety: at most one distinct block hash finalized at height 1, and
    // one distinct state commitment among finalized nodes.
    let mut block_hashes: Vec<&str> = finalized
        .iter()
        .map(|node| node.ledger()[0].hash.as_str())
        .collect();
    block_hashes.sort();
    block_hashes.dedup();
    assert_eq!(block_hashes.len(), 1);

    let mut commitments: Vec<String> = finalized
        .iter()
        .map(|node| node.state_commitment())
        .collect();
    commitments.sort();
    commitments.dedup();
    assert_eq!(commitments.len(), 1);
}

/// Duplicated deliveries never double-apply: handlers are keyed by message
/// id, not by arrival count.
#[test]
fn duplication_does_not_break_agreement() {
    let config = NetworkConfig {
        duplicate_rate: 1.0,
        ..lossless_config()
    };
    let mut sim = build_network(config, 5, 11);

    let keypair = KeyPair::from_seed([3u8; 32]);
    let tx = Transaction::signed("carol", "carol/note", "hi", &keypair, CHAIN);
    assert!(sim.node_mut(&node_id(0)).unwrap().submit_transaction(tx));

    propose_from(&mut sim, &node_id(0));
    run_ticks(&mut sim, 40, Duration::from_millis(50));

    assert_eq!(heights(&sim), vec![1; 5]);
    assert_eq!(distinct_commitments(&sim), 1);
    assert!(sim.stats().messages_duplicated > 0);
}
