//! Wire messages and node outputs for quorumsim.
//!
//! The node is a synchronous state machine: the transport hands it an
//! [`Envelope`] and receives back a list of [`Action`]s describing what to
//! put on the wire. The node performs no I/O itself.
//!
//! ```text
//! Envelope → ValidatorNode::handle_envelope() → Vec<Action>
//! ```
//!
//! This split breaks the node↔network reference cycle: the transport owns
//! the nodes and routes their intents, and the node never holds a network
//! handle.

mod action;
mod message;

pub use action::Action;
pub use message::{Envelope, MessageId, Payload};
