//! Typed wire messages.

use quorumsim_types::{Block, NodeId, Transaction, Vote};
use std::fmt;

/// Unique identifier of a logical message: the sending node plus a
/// per-node sequence number.
///
/// This is the sole dedupe key at receivers. The transport may duplicate a
/// message (same id, filtered by the seen-set); two independently created
/// messages with identical payloads are different messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub sender: NodeId,
    pub seq: u64,
}

impl MessageId {
    pub fn new(sender: NodeId, seq: u64) -> Self {
        Self { sender, seq }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sender, self.seq)
    }
}

/// The five message kinds, each with its typed body.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A client transaction offered for inclusion.
    Transaction(Transaction),

    /// A proposed block announced by its proposer (also used to answer
    /// [`Payload::RequestBlock`]).
    BlockHeader(Block),

    /// First-phase vote.
    Prevote(Vote),

    /// Second-phase vote.
    Precommit(Vote),

    /// Ask a peer to re-announce a finalized block.
    RequestBlock { height: u64, requester: NodeId },
}

/// A message in flight: payload plus sender, dedupe id, and the virtual
/// time it was created.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub payload: Payload,
    pub sender: NodeId,
    pub msg_id: MessageId,
    pub timestamp: f64,
}

impl Envelope {
    /// Wire name of the payload kind, as recorded in the event log.
    pub fn msg_type(&self) -> &'static str {
        match &self.payload {
            Payload::Transaction(_) => "transaction",
            Payload::BlockHeader(_) => "block_header",
            Payload::Prevote(_) => "prevote",
            Payload::Precommit(_) => "precommit",
            Payload::RequestBlock { .. } => "request_block",
        }
    }

    /// Block height, when the payload reveals one. Used for log details.
    pub fn height_hint(&self) -> Option<u64> {
        match &self.payload {
            Payload::Transaction(_) => None,
            Payload::BlockHeader(block) => Some(block.height),
            Payload::Prevote(vote) | Payload::Precommit(vote) => Some(vote.height),
            Payload::RequestBlock { height, .. } => Some(*height),
        }
    }
}
