//! Entity identity and attribute snapshots.
//!
//! # Invariants
//! - `EntityId` is stable across every version of one entity.
//! - An entity's kind is fixed at creation.
//! - `Attributes` iterate and compare in key order, so equal snapshots
//!   serialize identically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable identifier shared by every version of one entity.
pub type EntityId = Uuid;

/// Snapshot of all tracked fields of an entity at one version.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Role an entity plays inside an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Aggregate owner (an issue).
    Root,
    /// Member attached to at most one root at a time (a thesis).
    Child,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Child => "child",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "root" => Some(Self::Root),
            "child" => Some(Self::Child),
            _ => None,
        }
    }
}
