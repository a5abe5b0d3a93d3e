//! Two-phase consensus votes.

use crate::block::BlockHash;
use crate::crypto::{KeyPair, PublicKey, Signature};
use crate::signing::{sign_payload, verify_payload, DOMAIN_VOTE};
use crate::validator::NodeId;
use serde_json::{json, Value};
use std::fmt;

/// Voting phase: majority prevotes authorize a precommit, majority
/// precommits finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VotePhase {
    Prevote,
    Precommit,
}

impl VotePhase {
    /// Wire string, as embedded in the signed payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            VotePhase::Prevote => "prevote",
            VotePhase::Precommit => "precommit",
        }
    }
}

impl fmt::Display for VotePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vote on `(height, block_hash)` in one phase, signed by `voter`.
///
/// The public key rides alongside the signature; membership of `voter` in
/// the validator set is checked separately by the receiver.
#[derive(Debug, Clone)]
pub struct Vote {
    pub height: u64,
    pub block_hash: BlockHash,
    pub phase: VotePhase,
    pub voter: NodeId,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl Vote {
    /// Create and sign a vote in the `VOTE` domain.
    pub fn signed(
        height: u64,
        block_hash: impl Into<BlockHash>,
        phase: VotePhase,
        voter: NodeId,
        keypair: &KeyPair,
        chain_id: &str,
    ) -> Self {
        let block_hash = block_hash.into();
        let payload = Self::payload_for(height, &block_hash, phase, &voter);
        let signature = sign_payload(keypair, DOMAIN_VOTE, chain_id, &payload);
        Self {
            height,
            block_hash,
            phase,
            voter,
            signature,
            public_key: keypair.public_key(),
        }
    }

    /// The signed fields: `{height, block_hash, phase, voter}`.
    pub fn payload(&self) -> Value {
        Self::payload_for(self.height, &self.block_hash, self.phase, &self.voter)
    }

    fn payload_for(height: u64, block_hash: &str, phase: VotePhase, voter: &NodeId) -> Value {
        json!({
            "height": height,
            "block_hash": block_hash,
            "phase": phase.as_str(),
            "voter": voter,
        })
    }

    /// Verify the signature against the travelling public key.
    pub fn verify(&self, chain_id: &str) -> bool {
        verify_payload(
            &self.public_key,
            DOMAIN_VOTE,
            chain_id,
            &self.payload(),
            &self.signature,
        )
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vote({}, h={}, voter={})", self.phase, self.height, self.voter)
    }
}
