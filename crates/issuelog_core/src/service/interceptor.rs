//! Change interceptor: the single write path into the history.
//!
//! # Responsibility
//! - Turn "created", "attribute changed", "child attached" and "child
//!   removed" notifications into version log entries and membership intervals.
//! - Cascade a root version for every child-level event, explicitly.
//!
//! # Invariants
//! - Each public operation is one atomic write scope: either every record it
//!   implies is written, or none is.
//! - A cascading root version repeats the root's latest attributes and carries
//!   the triggering child's timestamp and id.
//! - One cascading version per triggering event; events sharing a timestamp
//!   are never coalesced.

use crate::clock::Timestamp;
use crate::model::entity::{Attributes, EntityId, EntityKind};
use crate::model::version::{MembershipInterval, Version, VersionEvent};
use crate::repo::store::HistoryStore;
use crate::service::error::{EngineError, EngineResult};
use log::debug;

/// Write path shared by the engine facade and the revert engine.
pub struct ChangeInterceptor<'s, S: HistoryStore> {
    store: &'s S,
}

/// Result of a membership change: the interval plus the root's cascading
/// version.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipChange {
    pub interval: MembershipInterval,
    pub root_version: Version,
}

impl<'s, S: HistoryStore> ChangeInterceptor<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Registers a new entity and records its first version.
    pub fn record_created(
        &self,
        entity_id: EntityId,
        kind: EntityKind,
        attributes: &Attributes,
        timestamp: Timestamp,
    ) -> EngineResult<Version> {
        self.store.write_scope(|store| {
            store.register_entity(entity_id, kind, timestamp)?;
            let version =
                store.append(entity_id, attributes, timestamp, VersionEvent::Create, None)?;
            log_recorded(&version);
            Ok(version)
        })
    }

    /// Records new attributes for `entity_id`.
    ///
    /// When the entity is a child attached to a root, the root receives a
    /// cascading version at the same timestamp. Returns the entity's own new
    /// version.
    pub fn record_attribute_change(
        &self,
        entity_id: EntityId,
        new_attributes: &Attributes,
        timestamp: Timestamp,
    ) -> EngineResult<Version> {
        self.store.write_scope(|store| {
            let kind = require_entity(store, entity_id)?;
            let version =
                store.append(entity_id, new_attributes, timestamp, VersionEvent::Update, None)?;
            log_recorded(&version);

            if kind == EntityKind::Child {
                if let Some(root_id) = store.owner_of(entity_id)? {
                    cascade_root_version(
                        store,
                        root_id,
                        entity_id,
                        timestamp,
                        VersionEvent::ChildUpdated,
                    )?;
                }
            }
            Ok(version)
        })
    }

    /// Attaches `child_id` to `root_id` and cascades a root version.
    pub fn record_attach(
        &self,
        root_id: EntityId,
        child_id: EntityId,
        timestamp: Timestamp,
    ) -> EngineResult<MembershipChange> {
        self.store.write_scope(|store| {
            require_kind(store, root_id, EntityKind::Root)?;
            require_kind(store, child_id, EntityKind::Child)?;
            let interval = store.attach(root_id, child_id, timestamp)?;
            let root_version = cascade_root_version(
                store,
                root_id,
                child_id,
                timestamp,
                VersionEvent::ChildAttached,
            )?;
            Ok(MembershipChange {
                interval,
                root_version,
            })
        })
    }

    /// Detaches `child_id` from `root_id` and cascades a root version.
    pub fn record_detach(
        &self,
        root_id: EntityId,
        child_id: EntityId,
        timestamp: Timestamp,
    ) -> EngineResult<MembershipChange> {
        self.store.write_scope(|store| {
            require_kind(store, root_id, EntityKind::Root)?;
            require_kind(store, child_id, EntityKind::Child)?;
            let interval = store.detach(root_id, child_id, timestamp)?;
            let root_version = cascade_root_version(
                store,
                root_id,
                child_id,
                timestamp,
                VersionEvent::ChildDetached,
            )?;
            Ok(MembershipChange {
                interval,
                root_version,
            })
        })
    }
}

fn cascade_root_version<S: HistoryStore>(
    store: &S,
    root_id: EntityId,
    child_id: EntityId,
    timestamp: Timestamp,
    event: VersionEvent,
) -> EngineResult<Version> {
    let current = store.latest(root_id)?;
    let version = store.append(
        root_id,
        &current.attributes,
        timestamp,
        event,
        Some(child_id),
    )?;
    log_recorded(&version);
    Ok(version)
}

pub(crate) fn require_entity<S: HistoryStore>(
    store: &S,
    entity_id: EntityId,
) -> EngineResult<EntityKind> {
    store
        .entity_kind(entity_id)?
        .ok_or(EngineError::EntityNotFound(entity_id))
}

pub(crate) fn require_kind<S: HistoryStore>(
    store: &S,
    entity_id: EntityId,
    expected: EntityKind,
) -> EngineResult<()> {
    let actual = require_entity(store, entity_id)?;
    if actual != expected {
        return Err(EngineError::WrongEntityKind {
            entity_id,
            expected,
            actual,
        });
    }
    Ok(())
}

fn log_recorded(version: &Version) {
    debug!(
        "event=version_recorded module=interceptor status=ok entity_id={} index={} cause={} related_id={} created_at={}",
        version.entity_id,
        version.index,
        version.event.as_str(),
        version
            .related_id
            .map_or_else(|| "-".to_string(), |id| id.to_string()),
        version.created_at
    );
}
