//! Run orchestration for quorumsim.
//!
//! The orchestrator sits outside the core: it loads configuration, wires
//! nodes into the transport, injects generated transactions, rotates the
//! proposer role, advances virtual time in discrete quanta, and verifies
//! that every replica converged.

mod config;
mod runner;

pub use config::{ConfigError, SimConfig};
pub use runner::{Simulation, SimulationReport};
