//! Immutable history records.
//!
//! # Invariants
//! - For one entity, `index` runs `1..=N` without gaps.
//! - `created_at` never decreases as `index` grows.
//! - A membership interval covers `[added_at, removed_at)`; `removed_at = None`
//!   means the child is still attached.

use super::entity::{Attributes, EntityId};
use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};

/// Why a version was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionEvent {
    /// First snapshot of a new entity.
    Create,
    /// The entity's own attributes changed.
    Update,
    /// Cascading root version: a child was attached.
    ChildAttached,
    /// Cascading root version: a child was detached.
    ChildDetached,
    /// Cascading root version: an attached child gained a version.
    ChildUpdated,
}

impl VersionEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::ChildAttached => "child_attached",
            Self::ChildDetached => "child_detached",
            Self::ChildUpdated => "child_updated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "child_attached" => Some(Self::ChildAttached),
            "child_detached" => Some(Self::ChildDetached),
            "child_updated" => Some(Self::ChildUpdated),
            _ => None,
        }
    }

    /// Whether this version exists only because something beneath the root
    /// changed.
    pub fn is_cascading(self) -> bool {
        matches!(
            self,
            Self::ChildAttached | Self::ChildDetached | Self::ChildUpdated
        )
    }
}

/// One immutable snapshot of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub entity_id: EntityId,
    /// 1-based, dense, per entity.
    pub index: u32,
    pub created_at: Timestamp,
    pub event: VersionEvent,
    /// Child that triggered a cascading version.
    pub related_id: Option<EntityId>,
    pub attributes: Attributes,
}

/// Span during which a child was attached to a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipInterval {
    pub root_id: EntityId,
    pub child_id: EntityId,
    pub added_at: Timestamp,
    pub removed_at: Option<Timestamp>,
}

impl MembershipInterval {
    pub fn is_open(&self) -> bool {
        self.removed_at.is_none()
    }

    /// Whether the child was attached at `timestamp`.
    pub fn covers(&self, timestamp: Timestamp) -> bool {
        self.added_at <= timestamp && self.removed_at.map_or(true, |end| end > timestamp)
    }
}
