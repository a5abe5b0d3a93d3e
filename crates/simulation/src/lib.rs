//! Virtual-time network simulation for quorumsim.
//!
//! [`NetSim`] owns the nodes and drives them over a simulated clock,
//! modeling delay, drop, duplication, and per-sender rate limiting with a
//! seeded RNG. Every transport lifecycle step is appended to an
//! [`EventLog`], the auditable artifact of a run: same seed, same journal,
//! byte for byte.

mod journal;
mod network;

pub use journal::{EventLog, JournalError, LogRecord};
pub use network::{NetSim, NetworkConfig, NetworkStats};
