//! Outputs of the node state machine.

use crate::message::Envelope;
use quorumsim_types::NodeId;

/// What a node wants the transport to do after handling an input.
///
/// The transport executes these in order: rate limiting, fault injection,
/// and delivery scheduling all happen on the transport side.
#[derive(Debug, Clone)]
pub enum Action {
    /// Deliver to every registered node except the sender.
    Broadcast(Envelope),

    /// Deliver to a single recipient.
    Send { to: NodeId, envelope: Envelope },
}
