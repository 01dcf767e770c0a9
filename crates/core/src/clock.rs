//! Vector clocks for the masterless replication strategy.
//!
//! A clock maps node id to a monotone counter of that node's accepted
//! writes. Two clocks are comparable iff one dominates the other
//! componentwise across the union of known ids; otherwise the events they
//! stamp are concurrent and conflict resolution kicks in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Per-node counter vector.
///
/// Serialized as a JSON object keyed by the stringified node id; JSON has
/// no integer keys, and serde_json performs that conversion both ways, so
/// code only ever sees `u64` ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock(BTreeMap<NodeId, u64>);

impl VectorClock {
    /// Empty clock: every component implicitly zero.
    pub fn new() -> Self {
        VectorClock(BTreeMap::new())
    }

    /// This clock's component for `node` (zero when absent).
    pub fn get(&self, node: NodeId) -> u64 {
        self.0.get(&node).copied().unwrap_or(0)
    }

    /// Increment `node`'s own component, returning the new value.
    pub fn increment(&mut self, node: NodeId) -> u64 {
        let counter = self.0.entry(node).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Componentwise maximum with `other`.
    pub fn merge(&mut self, other: &VectorClock) {
        for (&node, &counter) in &other.0 {
            let mine = self.0.entry(node).or_insert(0);
            if counter > *mine {
                *mine = counter;
            }
        }
    }

    /// True when every component of `self` is ≥ the matching component of
    /// `other`, i.e. `other` happened before or equals `self`.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        other.0.iter().all(|(&node, &counter)| self.get(node) >= counter)
    }

    /// Neither clock dominates the other: the stamped events are concurrent.
    pub fn concurrent_with(&self, other: &VectorClock) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Number of known components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no component has been touched.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
