//! Per-height vote aggregation.

use quorumsim_types::{BlockHash, NodeId, VotePhase};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Two-level vote books, one per phase: `height → block_hash → voters`.
///
/// Voter sets give O(1)-ish dedup and counting; heights at or below the
/// finalized height are pruned after every finalization.
#[derive(Debug, Default)]
pub struct VoteBook {
    prevotes: BTreeMap<u64, HashMap<BlockHash, BTreeSet<NodeId>>>,
    precommits: BTreeMap<u64, HashMap<BlockHash, BTreeSet<NodeId>>>,
}

impl VoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, phase: VotePhase) -> &BTreeMap<u64, HashMap<BlockHash, BTreeSet<NodeId>>> {
        match phase {
            VotePhase::Prevote => &self.prevotes,
            VotePhase::Precommit => &self.precommits,
        }
    }

    fn book_mut(
        &mut self,
        phase: VotePhase,
    ) -> &mut BTreeMap<u64, HashMap<BlockHash, BTreeSet<NodeId>>> {
        match phase {
            VotePhase::Prevote => &mut self.prevotes,
            VotePhase::Precommit => &mut self.precommits,
        }
    }

    /// Record a vote. Returns false when this voter was already counted
    /// for the same `(height, block_hash)` pair.
    pub fn record(&mut self, phase: VotePhase, height: u64, block_hash: &str, voter: NodeId) -> bool {
        self.book_mut(phase)
            .entry(height)
            .or_default()
            .entry(block_hash.to_string())
            .or_default()
            .insert(voter)
    }

    /// Number of distinct voters for `(height, block_hash)` in a phase.
    pub fn count(&self, phase: VotePhase, height: u64, block_hash: &str) -> usize {
        self.book(phase)
            .get(&height)
            .and_then(|by_hash| by_hash.get(block_hash))
            .map(BTreeSet::len)
            .unwrap_or(0)
    }

    /// All `(block_hash, voter count)` tallies at a height in a phase.
    pub fn tallies(&self, phase: VotePhase, height: u64) -> Vec<(BlockHash, usize)> {
        self.book(phase)
            .get(&height)
            .map(|by_hash| {
                by_hash
                    .iter()
                    .map(|(hash, voters)| (hash.clone(), voters.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every entry at or below `height`.
    pub fn prune_through(&mut self, height: u64) {
        self.prevotes = self.prevotes.split_off(&(height + 1));
        self.precommits = self.precommits.split_off(&(height + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voter(i: usize) -> NodeId {
        NodeId::new(format!("node{i}"))
    }

    #[test]
    fn counts_distinct_voters() {
        let mut book = VoteBook::new();
        assert!(book.record(VotePhase::Prevote, 1, "abc", voter(0)));
        assert!(book.record(VotePhase::Prevote, 1, "abc", voter(1)));
        assert_eq!(book.count(VotePhase::Prevote, 1, "abc"), 2);
    }

    #[test]
    fn duplicate_voter_is_not_counted_twice() {
        let mut book = VoteBook::new();
        assert!(book.record(VotePhase::Prevote, 1, "abc", voter(0)));
        assert!(!book.record(VotePhase::Prevote, 1, "abc", voter(0)));
        assert_eq!(book.count(VotePhase::Prevote, 1, "abc"), 1);
    }

    #[test]
    fn phases_are_independent() {
        let mut book = VoteBook::new();
        book.record(VotePhase::Prevote, 1, "abc", voter(0));
        assert_eq!(book.count(VotePhase::Precommit, 1, "abc"), 0);
    }

    #[test]
    fn tallies_split_by_hash() {
        let mut book = VoteBook::new();
        book.record(VotePhase::Precommit, 2, "aaa", voter(0));
        book.record(VotePhase::Precommit, 2, "aaa", voter(1));
        book.record(VotePhase::Precommit, 2, "bbb", voter(2));

        let mut tallies = book.tallies(VotePhase::Precommit, 2);
        tallies.sort();
        assert_eq!(tallies, vec![("aaa".to_string(), 2), ("bbb".to_string(), 1)]);
    }

    #[test]
    fn prune_drops_old_heights_only() {
        let mut book = VoteBook::new();
        book.record(VotePhase::Prevote, 1, "a", voter(0));
        book.record(VotePhase::Prevote, 2, "b", voter(0));
        book.record(VotePhase::Precommit, 3, "c", voter(0));

        book.prune_through(2);
        assert_eq!(book.count(VotePhase::Prevote, 1, "a"), 0);
        assert_eq!(book.count(VotePhase::Prevote, 2, "b"), 0);
        assert_eq!(book.count(VotePhase::Precommit, 3, "c"), 1);
    }
}
