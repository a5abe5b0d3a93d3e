//! The per-node consensus state machine.
//!
//! [`ValidatorNode`] implements the two-phase (prevote → precommit) voting
//! protocol over a replicated key/value state. It is synchronous and
//! deterministic: the transport hands it one envelope at a time and
//! executes the actions it returns. All I/O lives on the transport side.

mod state;
mod vote_book;

pub use state::{BlockError, ValidatorNode};
pub use vote_book::VoteBook;
