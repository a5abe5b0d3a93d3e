//! The validator node state machine.
//!
//! # State Machine Flow
//!
//! 1. **Block header received** → validate, buffer, prevote if validator
//! 2. **Prevote received** → record; on majority, precommit
//! 3. **Precommit received** → record; on majority, finalize
//! 4. **Finalized** → apply, append, advance height, cascade to buffered
//!    blocks
//!
//! Every handler completes atomically before the next delivery. Malformed,
//! duplicate, and out-of-range inputs are silently discarded; a node is
//! never taken out of service by a bad input.

use quorumsim_core::{Action, Envelope, MessageId, Payload};
use quorumsim_types::{
    Block, BlockHash, KeyPair, NodeId, StateStore, Transaction, ValidatorSet, Vote, VotePhase,
    GENESIS_PARENT,
};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::vote_book::VoteBook;

/// Why a received block was rejected. Consumed by `warn!` logging only;
/// rejection is always a silent discard at the protocol level.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("height {got} does not follow current height {current}")]
    HeightMismatch { got: u64, current: u64 },

    #[error("parent hash {got} does not match ledger tip {expected}")]
    ParentMismatch { got: String, expected: String },

    #[error("first block must link to the genesis parent, got {got}")]
    BadGenesisLink { got: String },

    #[error("block contains an invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("state hash mismatch: expected {expected}, got {got}")]
    StateHashMismatch { expected: String, got: String },
}

/// A single node: consensus state machine plus replicated state.
///
/// The node owns its state, ledger, vote books, and buffers exclusively.
/// It communicates only through returned [`Action`]s; votes and proposals
/// it emits are also processed locally first (self-delivery), so a
/// proposer counts its own vote in step with its peers.
pub struct ValidatorNode {
    node_id: NodeId,
    is_validator: bool,
    chain_id: String,
    keypair: KeyPair,

    // Replicated state
    state: StateStore,
    ledger: Vec<Block>,
    pending_transactions: Vec<Transaction>,

    // Consensus
    current_height: u64,
    pending_blocks: BTreeMap<u64, Block>,
    votes: VoteBook,
    validators: ValidatorSet,

    // Dedupe and re-emission guards
    seen_messages: HashSet<MessageId>,
    sent_prevotes: HashSet<(u64, BlockHash)>,
    sent_precommits: HashSet<(u64, BlockHash)>,

    // Wire bookkeeping
    msg_seq: u64,
    now: Duration,
}

impl ValidatorNode {
    pub fn new(
        node_id: NodeId,
        is_validator: bool,
        chain_id: impl Into<String>,
        keypair: KeyPair,
    ) -> Self {
        let chain_id = chain_id.into();
        Self {
            node_id,
            is_validator,
            state: StateStore::new(chain_id.clone()),
            chain_id,
            keypair,
            ledger: Vec::new(),
            pending_transactions: Vec::new(),
            current_height: 0,
            pending_blocks: BTreeMap::new(),
            votes: VoteBook::new(),
            validators: ValidatorSet::default(),
            seen_messages: HashSet::new(),
            sent_prevotes: HashSet::new(),
            sent_precommits: HashSet::new(),
            msg_seq: 0,
            now: Duration::ZERO,
        }
    }

    // ─── Accessors ───

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn is_validator(&self) -> bool {
        self.is_validator
    }

    pub fn current_height(&self) -> u64 {
        self.current_height
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn state_commitment(&self) -> String {
        self.state.commitment()
    }

    pub fn ledger(&self) -> &[Block] {
        &self.ledger
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn votes(&self) -> &VoteBook {
        &self.votes
    }

    // ─── Wiring ───

    /// Install the static validator membership (identical on every node).
    pub fn set_validators(&mut self, validators: ValidatorSet) {
        self.validators = validators;
    }

    /// Advance the node's virtual clock. Called by the transport before
    /// each delivery so outbound envelopes carry delivery-time stamps.
    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    /// Inject a transaction directly into the local queue (client path).
    pub fn submit_transaction(&mut self, tx: Transaction) -> bool {
        if !tx.verify(&self.chain_id) {
            warn!(node = %self.node_id, tx = %tx, "rejecting submitted transaction");
            return false;
        }
        debug!(node = %self.node_id, tx = %tx, "queued transaction");
        self.pending_transactions.push(tx);
        true
    }

    // ─── Message handling ───

    /// Process one inbound message and return the outbound intents.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> Vec<Action> {
        // msg_id dedupe: the transport may duplicate deliveries.
        if !self.seen_messages.insert(envelope.msg_id.clone()) {
            trace!(node = %self.node_id, msg_id = %envelope.msg_id, "dropping duplicate message");
            return vec![];
        }

        match envelope.payload {
            Payload::Transaction(tx) => {
                self.on_transaction(tx);
                vec![]
            }
            Payload::BlockHeader(block) => self.on_block_header(block),
            Payload::Prevote(vote) => self.on_vote(vote, VotePhase::Prevote),
            Payload::Precommit(vote) => self.on_vote(vote, VotePhase::Precommit),
            Payload::RequestBlock { height, requester } => self.on_request_block(height, requester),
        }
    }

    fn on_transaction(&mut self, tx: Transaction) {
        if !tx.verify(&self.chain_id) {
            warn!(node = %self.node_id, tx = %tx, "discarding invalid transaction");
            return;
        }
        debug!(node = %self.node_id, tx = %tx, "accepted transaction");
        self.pending_transactions.push(tx);
    }

    fn on_block_header(&mut self, block: Block) -> Vec<Action> {
        let height = block.height;
        let next = self.current_height + 1;

        if height < next {
            trace!(
                node = %self.node_id,
                height,
                current = self.current_height,
                "discarding header for finalized height"
            );
            return vec![];
        }

        if height > next {
            // The state needed to validate this block does not exist yet;
            // buffer it unvalidated until earlier heights finalize.
            debug!(node = %self.node_id, height, "buffering future block header");
            self.pending_blocks.insert(height, block);
            return vec![];
        }

        if let Err(err) = self.validate_block(&block) {
            warn!(node = %self.node_id, height, error = %err, "ignoring invalid block");
            return vec![];
        }

        let block_hash = block.hash.clone();
        debug!(node = %self.node_id, height, block_hash = %block_hash, "stored pending block");
        self.pending_blocks.insert(height, block);

        let mut actions = vec![];
        if self.is_validator {
            actions.extend(self.send_prevote(height, block_hash.clone()));
        }

        // Precommits may have reached majority before the header arrived
        // (votes are accepted for any future height, headers are not).
        if let Some(hash) = self.majority_precommit_hash(height) {
            if hash == block_hash {
                self.try_finalize(height, &hash);
            }
        }

        actions
    }

    fn on_vote(&mut self, vote: Vote, expected_phase: VotePhase) -> Vec<Action> {
        if vote.phase != expected_phase {
            warn!(
                node = %self.node_id,
                voter = %vote.voter,
                phase = %vote.phase,
                expected = %expected_phase,
                "discarding vote whose phase disagrees with its message kind"
            );
            return vec![];
        }

        if !vote.verify(&self.chain_id) {
            warn!(node = %self.node_id, voter = %vote.voter, "discarding vote with bad signature");
            return vec![];
        }

        let height = vote.height;
        if height < self.current_height + 1 {
            trace!(node = %self.node_id, height, "discarding vote for finalized height");
            return vec![];
        }

        if !self.validators.contains(&vote.voter) {
            warn!(node = %self.node_id, voter = %vote.voter, "discarding vote from non-validator");
            return vec![];
        }

        let block_hash = vote.block_hash.clone();
        self.votes
            .record(expected_phase, height, &block_hash, vote.voter.clone());
        let count = self.votes.count(expected_phase, height, &block_hash);
        trace!(
            node = %self.node_id,
            phase = %expected_phase,
            height,
            block_hash = %block_hash,
            count,
            "recorded vote"
        );

        let mut actions = vec![];
        match expected_phase {
            VotePhase::Prevote => {
                // A node that only learned of the block through votes still
                // owes its own prevote once it can validate the block.
                if self.is_validator
                    && height == self.current_height + 1
                    && !self.sent_prevotes.contains(&(height, block_hash.clone()))
                {
                    let validates = self
                        .pending_blocks
                        .get(&height)
                        .is_some_and(|block| {
                            block.hash == block_hash && self.validate_block(block).is_ok()
                        });
                    if validates {
                        actions.extend(self.send_prevote(height, block_hash.clone()));
                    }
                }

                if self.is_validator && self.validators.is_majority(count) {
                    actions.extend(self.send_precommit(height, block_hash));
                }
            }
            VotePhase::Precommit => {
                if self.validators.is_majority(count) {
                    self.try_finalize(height, &block_hash);
                }
            }
        }
        actions
    }

    fn on_request_block(&mut self, height: u64, requester: NodeId) -> Vec<Action> {
        if height == 0 || (self.ledger.len() as u64) < height {
            trace!(node = %self.node_id, height, "cannot serve block request");
            return vec![];
        }
        let block = self.ledger[(height - 1) as usize].clone();
        debug!(node = %self.node_id, height, requester = %requester, "serving block request");
        let envelope = self.next_envelope(Payload::BlockHeader(block));
        vec![Action::Send {
            to: requester,
            envelope,
        }]
    }

    // ─── Proposer role ───

    /// Build a block from the pending queue, broadcast it, and self-receive
    /// it. Invalid queued transactions are skipped, the queue is cleared.
    /// Leader selection is external; the core does not enforce a single
    /// proposer per height.
    pub fn propose_block(&mut self) -> Vec<Action> {
        if self.pending_transactions.is_empty() {
            debug!(node = %self.node_id, "no transactions to propose");
            return vec![];
        }

        let parent_hash: BlockHash = self
            .ledger
            .last()
            .map(|block| block.hash.clone())
            .unwrap_or_else(|| GENESIS_PARENT.to_string());

        let mut speculative = self.state.clone();
        let mut valid = Vec::new();
        for tx in std::mem::take(&mut self.pending_transactions) {
            match speculative.apply_transaction(&tx) {
                Ok(()) => valid.push(tx),
                Err(err) => {
                    warn!(node = %self.node_id, error = %err, "dropping transaction from proposal")
                }
            }
        }
        if valid.is_empty() {
            debug!(node = %self.node_id, "no valid transactions to propose");
            return vec![];
        }

        let tx_count = valid.len();
        let mut block = Block::new(
            self.current_height + 1,
            parent_hash,
            valid,
            speculative.commitment(),
        );
        block.sign_header(&self.keypair, &self.chain_id);

        info!(
            node = %self.node_id,
            height = block.height,
            block_hash = %block.hash,
            transactions = tx_count,
            "proposing block"
        );

        let envelope = self.next_envelope(Payload::BlockHeader(block));
        let mut actions = vec![Action::Broadcast(envelope.clone())];
        // Self-delivery: see our own proposal before the transport does.
        actions.extend(self.handle_envelope(envelope));
        actions
    }

    /// Ask `peer` to re-announce the block at the next height we need.
    /// The orchestrator drives this for nodes that fell behind.
    pub fn request_block_from(&mut self, peer: &NodeId) -> Vec<Action> {
        let height = self.current_height + 1;
        debug!(node = %self.node_id, peer = %peer, height, "requesting block");
        let envelope = self.next_envelope(Payload::RequestBlock {
            height,
            requester: self.node_id.clone(),
        });
        vec![Action::Send {
            to: peer.clone(),
            envelope,
        }]
    }

    // ─── Voting ───

    fn send_prevote(&mut self, height: u64, block_hash: BlockHash) -> Vec<Action> {
        let key = (height, block_hash.clone());
        if !self.sent_prevotes.insert(key) {
            return vec![];
        }

        let vote = Vote::signed(
            height,
            block_hash.clone(),
            VotePhase::Prevote,
            self.node_id.clone(),
            &self.keypair,
            &self.chain_id,
        );
        debug!(node = %self.node_id, height, block_hash = %block_hash, "prevoting");

        let envelope = self.next_envelope(Payload::Prevote(vote.clone()));
        let mut actions = vec![Action::Broadcast(envelope)];
        // Count our own vote immediately, ahead of transport delivery.
        actions.extend(self.on_vote(vote, VotePhase::Prevote));
        actions
    }

    fn send_precommit(&mut self, height: u64, block_hash: BlockHash) -> Vec<Action> {
        let key = (height, block_hash.clone());
        if !self.sent_precommits.insert(key) {
            return vec![];
        }

        let vote = Vote::signed(
            height,
            block_hash.clone(),
            VotePhase::Precommit,
            self.node_id.clone(),
            &self.keypair,
            &self.chain_id,
        );
        debug!(node = %self.node_id, height, block_hash = %block_hash, "precommitting");

        let envelope = self.next_envelope(Payload::Precommit(vote.clone()));
        let mut actions = vec![Action::Broadcast(envelope)];
        actions.extend(self.on_vote(vote, VotePhase::Precommit));
        actions
    }

    // ─── Validation and finalization ───

    /// Validate a block against the node's current chain position:
    /// sequential height, parent link (or genesis), every transaction
    /// verifies, and re-execution reproduces the claimed state hash.
    fn validate_block(&self, block: &Block) -> Result<(), BlockError> {
        if block.height != self.current_height + 1 {
            return Err(BlockError::HeightMismatch {
                got: block.height,
                current: self.current_height,
            });
        }

        match self.ledger.last() {
            Some(tip) => {
                if block.parent_hash != tip.hash {
                    return Err(BlockError::ParentMismatch {
                        got: block.parent_hash.clone(),
                        expected: tip.hash.clone(),
                    });
                }
            }
            None => {
                if block.parent_hash != GENESIS_PARENT {
                    return Err(BlockError::BadGenesisLink {
                        got: block.parent_hash.clone(),
                    });
                }
            }
        }

        for tx in &block.transactions {
            if !tx.verify(&self.chain_id) {
                return Err(BlockError::InvalidTransaction(tx.to_string()));
            }
        }

        let mut speculative = self.state.clone();
        for tx in &block.transactions {
            speculative
                .apply_transaction(tx)
                .map_err(|err| BlockError::InvalidTransaction(err.to_string()))?;
        }
        let expected = speculative.commitment();
        if block.state_hash != expected {
            return Err(BlockError::StateHashMismatch {
                expected,
                got: block.state_hash.clone(),
            });
        }

        Ok(())
    }

    /// Finalize `(height, block_hash)` and then cascade through buffered
    /// blocks whose precommits already reached majority.
    fn try_finalize(&mut self, height: u64, block_hash: &str) {
        if !self.finalize_block(height, block_hash) {
            return;
        }
        while let Some(hash) = self.majority_precommit_hash(self.current_height + 1) {
            if !self.finalize_block(self.current_height + 1, &hash) {
                break;
            }
        }
    }

    fn finalize_block(&mut self, height: u64, block_hash: &str) -> bool {
        if height != self.current_height + 1 {
            trace!(
                node = %self.node_id,
                height,
                current = self.current_height,
                "not ready to finalize"
            );
            return false;
        }

        let block = match self.pending_blocks.get(&height) {
            Some(block) if block.hash == block_hash => block.clone(),
            _ => {
                trace!(node = %self.node_id, height, "no matching pending block to finalize");
                return false;
            }
        };

        if let Err(err) = self.validate_block(&block) {
            warn!(node = %self.node_id, height, error = %err, "refusing to finalize invalid block");
            return false;
        }

        for tx in &block.transactions {
            if let Err(err) = self.state.apply_transaction(tx) {
                // Should be unreachable: the block just passed validation.
                error!(
                    node = %self.node_id,
                    height,
                    error = %err,
                    "transaction failed on live state after passing block validation"
                );
                return false;
            }
        }

        self.ledger.push(block);
        self.current_height = height;
        info!(
            node = %self.node_id,
            height,
            block_hash = %block_hash,
            "finalized block"
        );

        // Discard everything at or below the finalized height.
        self.votes.prune_through(height);
        self.pending_blocks = self.pending_blocks.split_off(&(height + 1));
        true
    }

    fn majority_precommit_hash(&self, height: u64) -> Option<BlockHash> {
        self.votes
            .tallies(VotePhase::Precommit, height)
            .into_iter()
            .find(|(_, count)| self.validators.is_majority(*count))
            .map(|(hash, _)| hash)
    }

    fn next_envelope(&mut self, payload: Payload) -> Envelope {
        self.msg_seq += 1;
        Envelope {
            payload,
            sender: self.node_id.clone(),
            msg_id: MessageId::new(self.node_id.clone(), self.msg_seq),
            timestamp: self.now.as_secs_f64(),
        }
    }
}
