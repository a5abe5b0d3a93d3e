//! quorumsim CLI
//!
//! Runs a deterministic BFT consensus simulation over a lossy virtual
//! network and verifies replica agreement.
//!
//! # Example
//!
//! ```bash
//! # Default run: 8 validators, 3 blocks
//! quorumsim
//!
//! # Custom config with CLI overrides
//! quorumsim --config chain_config.json --nodes 5 --seed 7
//! ```

use clap::Parser;
use quorumsim_simulator::{SimConfig, Simulation};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Deterministic BFT replicated state machine simulator.
///
/// Given the same seed, a run produces an identical event journal and
/// identical replica states every time.
#[derive(Parser, Debug)]
#[command(name = "quorumsim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of validators (overrides config)
    #[arg(short = 'n', long)]
    nodes: Option<usize>,

    /// Number of blocks to produce (overrides config)
    #[arg(short = 'b', long)]
    blocks: Option<u64>,

    /// Number of transactions to generate (overrides config)
    #[arg(short = 't', long)]
    transactions: Option<usize>,

    /// Random seed for the deterministic run (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Event journal output path (overrides config)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,quorumsim_simulator=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match SimConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("ERROR: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => SimConfig::default(),
    };
    if let Some(nodes) = args.nodes {
        config.num_nodes = nodes;
    }
    if let Some(blocks) = args.blocks {
        config.num_blocks = blocks;
    }
    if let Some(transactions) = args.transactions {
        config.num_transactions = transactions;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(log_file) = args.log_file {
        config.log_file = log_file;
    }

    let log_file = config.log_file.clone();
    let mut simulation = Simulation::new(config);
    let report = match simulation.run() {
        Ok(report) => report,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("\n=== Simulation Complete ===");
    println!("Target height: {}", report.target_height);
    println!("\nNode heights:");
    for (id, height) in &report.heights {
        println!("  {id}: {height}");
    }
    println!("\nState commitments:");
    for (id, commitment) in &report.commitments {
        println!("  {id}: {}...", &commitment[..16]);
    }

    let stats = &report.stats;
    println!("\nNetwork statistics:");
    println!("  sent:         {}", stats.messages_sent);
    println!("  delivered:    {}", stats.messages_delivered);
    println!("  dropped:      {}", stats.messages_dropped);
    println!("  duplicated:   {}", stats.messages_duplicated);
    println!("  rate_limited: {}", stats.messages_rate_limited);
    println!("  delivery rate: {:.2}%", stats.delivery_rate() * 100.0);

    println!("\nJournal: {}", log_file.display());
    println!("  hash: {}...", &report.journal_hash[..16]);

    if report.all_agree() {
        println!("\nAll nodes agree.");
        ExitCode::SUCCESS
    } else {
        println!(
            "\nWARNING: divergence detected ({} distinct state hashes)",
            report.distinct_commitments
        );
        ExitCode::FAILURE
    }
}
