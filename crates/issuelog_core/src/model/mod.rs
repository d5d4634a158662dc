//! Domain model for versioned aggregates.
//!
//! # Responsibility
//! - Define entity identity, attribute snapshots and immutable history records.
//! - Define the read models returned by reconstruction and revert.
//! - Provide typed issue/thesis projections over attribute snapshots.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - History records are never mutated; change is expressed by new records.
//! - Membership is expressed as time-bounded intervals, not a mutable flag.

pub mod aggregate;
pub mod entity;
pub mod issue;
pub mod version;
