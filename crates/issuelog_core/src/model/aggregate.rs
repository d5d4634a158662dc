//! Read models produced by reconstruction and revert.

use super::entity::{Attributes, EntityId};
use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};

/// A child as it existed at the reconstruction instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildSnapshot {
    pub child_id: EntityId,
    /// Child version index the snapshot was taken from.
    pub version_index: u32,
    pub attributes: Attributes,
}

/// A member that could not be resolved at the reconstruction instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub child_id: EntityId,
    pub kind: InconsistencyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// The child was attached before it had any recorded version.
    AttachedBeforeFirstVersion,
    /// The child changed at the target instant without cascading onto the
    /// root, so its state at the target version cannot be told apart.
    AmbiguousAtInstant,
}

impl InconsistencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AttachedBeforeFirstVersion => "attached_before_first_version",
            Self::AmbiguousAtInstant => "ambiguous_at_instant",
        }
    }
}

/// Root plus member children as of `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateView {
    pub root_id: EntityId,
    /// Root version index the view was taken from.
    pub root_index: u32,
    pub root: Attributes,
    /// Ordered by child id.
    pub children: Vec<ChildSnapshot>,
    pub as_of: Timestamp,
    /// Members skipped because they could not be resolved.
    pub inconsistencies: Vec<Inconsistency>,
}

impl AggregateView {
    pub fn child(&self, child_id: EntityId) -> Option<&ChildSnapshot> {
        self.children.iter().find(|child| child.child_id == child_id)
    }

    pub fn child_ids(&self) -> Vec<EntityId> {
        self.children.iter().map(|child| child.child_id).collect()
    }

    /// Whether both views hold the same content, ignoring version indices
    /// and the reconstruction instant.
    pub fn same_content(&self, other: &AggregateView) -> bool {
        self.root_id == other.root_id
            && self.root == other.root
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|(left, right)| {
                    left.child_id == right.child_id && left.attributes == right.attributes
                })
    }
}

/// Outcome of a revert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevertedAggregate {
    pub root_id: EntityId,
    pub target_index: u32,
    pub target_timestamp: Timestamp,
    /// Timestamp stamped on every version the revert wrote.
    pub reverted_at: Timestamp,
    pub root_changed: bool,
    pub detached: Vec<EntityId>,
    pub attached: Vec<EntityId>,
    /// Children whose attributes were rewritten (including re-attached ones).
    pub updated_children: Vec<EntityId>,
    /// Root index after the revert; never lower than before it.
    pub root_index: u32,
    /// Aggregate state right after the revert.
    pub view: AggregateView,
}

impl RevertedAggregate {
    /// Whether the revert wrote anything at all.
    pub fn changed_anything(&self) -> bool {
        self.root_changed
            || !self.detached.is_empty()
            || !self.attached.is_empty()
            || !self.updated_children.is_empty()
    }
}
