//! Node identities and the static validator set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a node in the simulated network ("node0", "node1", ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Static, equal-weight validator membership, known to every node at
/// startup. Votes from identifiers outside the set are never counted.
#[derive(Debug, Clone, Default)]
pub struct ValidatorSet {
    members: BTreeSet<NodeId>,
}

impl ValidatorSet {
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Strict simple majority: more than half of the members.
    ///
    /// This is deliberately below the classical BFT `2f+1` bound; safety
    /// holds only under an honest, non-equivocating majority.
    pub fn is_majority(&self, voters: usize) -> bool {
        voters * 2 > self.members.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.members.iter()
    }
}
