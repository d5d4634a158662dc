//! Point-in-time resolver.
//!
//! # Responsibility
//! - Rebuild an aggregate (root plus member children) as of any instant from
//!   the version log and the membership intervals.
//!
//! # Invariants
//! - Read-only: never writes, never takes the writer lock.
//! - Deterministic for fixed timelines: children are ordered by id.
//! - A member without a version at the instant is reported as an
//!   inconsistency and skipped, never a hard failure.

use crate::clock::Timestamp;
use crate::model::aggregate::{AggregateView, ChildSnapshot, Inconsistency, InconsistencyKind};
use crate::model::entity::{EntityId, EntityKind};
use crate::model::version::{Version, VersionEvent};
use crate::repo::store::HistoryStore;
use crate::service::error::{EngineError, EngineResult};
use crate::service::interceptor::require_kind;
use log::warn;

pub struct PointInTimeResolver<'s, S: HistoryStore> {
    store: &'s S,
}

impl<'s, S: HistoryStore> PointInTimeResolver<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Reconstructs `root_id` as of `timestamp` inside one read snapshot.
    pub fn reconstruct(
        &self,
        root_id: EntityId,
        timestamp: Timestamp,
    ) -> EngineResult<AggregateView> {
        self.store
            .read_scope(|store| reconstruct_in(store, root_id, timestamp))
    }

    /// Reconstructs the aggregate exactly as root version `index` recorded it,
    /// ignoring later versions that share its timestamp.
    pub fn reconstruct_version(
        &self,
        root_id: EntityId,
        index: u32,
    ) -> EngineResult<AggregateView> {
        self.store
            .read_scope(|store| reconstruct_version_in(store, root_id, index))
    }
}

/// Reconstruction against whatever scope the caller already holds.
pub(crate) fn reconstruct_in<S: HistoryStore>(
    store: &S,
    root_id: EntityId,
    timestamp: Timestamp,
) -> EngineResult<AggregateView> {
    require_kind(store, root_id, EntityKind::Root)?;
    let root_version = store
        .version_at(root_id, timestamp)?
        .ok_or(EngineError::AggregateNotYetExisting { root_id, timestamp })?;

    let mut view = empty_view(root_version, timestamp);
    for child_id in store.members_at(root_id, timestamp)? {
        let version = store.version_at(child_id, timestamp)?;
        push_member(&mut view, child_id, version);
    }
    Ok(view)
}

/// Index-bounded reconstruction.
///
/// Versions after `index` at the same instant are undone: their membership
/// changes are reversed, and each `child_updated` cascade above `index`
/// drops the child's newest version at that instant.
pub(crate) fn reconstruct_version_in<S: HistoryStore>(
    store: &S,
    root_id: EntityId,
    index: u32,
) -> EngineResult<AggregateView> {
    require_kind(store, root_id, EntityKind::Root)?;
    let target = store.version_by_index(root_id, index)?;
    let instant = target.created_at;
    let (through_target, after_target): (Vec<Version>, Vec<Version>) = store
        .versions_at_instant(root_id, instant)?
        .into_iter()
        .partition(|version| version.index <= index);
    if after_target.is_empty() {
        return reconstruct_in(store, root_id, instant);
    }

    let mut members = store.members_at(root_id, instant)?;
    for version in after_target.iter().rev() {
        match (version.event, version.related_id) {
            (VersionEvent::ChildAttached, Some(child_id)) => {
                members.remove(&child_id);
            }
            (VersionEvent::ChildDetached, Some(child_id)) => {
                members.insert(child_id);
            }
            _ => {}
        }
    }

    let mut view = empty_view(target, instant);
    for child_id in members {
        let later_updates = cascaded_updates(&after_target, child_id);
        let all_updates = later_updates + cascaded_updates(&through_target, child_id);
        let own = store.versions_at_instant(child_id, instant)?;
        let own_updates = own
            .iter()
            .filter(|version| version.event == VersionEvent::Update)
            .count();
        let touched_later = after_target
            .iter()
            .any(|version| version.related_id == Some(child_id));
        if touched_later && own_updates != all_updates {
            report(&mut view, child_id, InconsistencyKind::AmbiguousAtInstant);
            continue;
        }

        let version = match own.len().checked_sub(later_updates) {
            Some(0) => store.version_at(child_id, instant.saturating_sub(1))?,
            Some(kept) => own.into_iter().nth(kept - 1),
            None => {
                report(&mut view, child_id, InconsistencyKind::AmbiguousAtInstant);
                continue;
            }
        };
        push_member(&mut view, child_id, version);
    }
    Ok(view)
}

fn empty_view(root_version: Version, as_of: Timestamp) -> AggregateView {
    AggregateView {
        root_id: root_version.entity_id,
        root_index: root_version.index,
        root: root_version.attributes,
        children: Vec::new(),
        as_of,
        inconsistencies: Vec::new(),
    }
}

fn cascaded_updates(root_versions: &[Version], child_id: EntityId) -> usize {
    root_versions
        .iter()
        .filter(|version| {
            version.event == VersionEvent::ChildUpdated && version.related_id == Some(child_id)
        })
        .count()
}

fn push_member(view: &mut AggregateView, child_id: EntityId, version: Option<Version>) {
    match version {
        Some(version) => view.children.push(ChildSnapshot {
            child_id,
            version_index: version.index,
            attributes: version.attributes,
        }),
        None => report(view, child_id, InconsistencyKind::AttachedBeforeFirstVersion),
    }
}

fn report(view: &mut AggregateView, child_id: EntityId, kind: InconsistencyKind) {
    warn!(
        "event=reconstruct module=resolver status=inconsistent root_id={} child_id={} as_of={} reason={}",
        view.root_id,
        child_id,
        view.as_of,
        kind.as_str()
    );
    view.inconsistencies.push(Inconsistency { child_id, kind });
}

#[cfg(test)]
mod tests {
    use super::PointInTimeResolver;
    use crate::db::open_db_in_memory;
    use crate::model::aggregate::InconsistencyKind;
    use crate::model::entity::{Attributes, EntityKind};
    use crate::repo::store::SqliteHistoryStore;
    use crate::service::error::EngineError;
    use crate::service::interceptor::ChangeInterceptor;
    use serde_json::json;
    use uuid::Uuid;

    fn summary(value: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("summary".to_string(), json!(value));
        attributes
    }

    #[test]
    fn reconstruct_before_root_creation_fails() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteHistoryStore::try_new(&conn).unwrap();
        let root = Uuid::new_v4();
        ChangeInterceptor::new(&store)
            .record_created(root, EntityKind::Root, &summary("issue"), 100)
            .unwrap();

        let err = PointInTimeResolver::new(&store)
            .reconstruct(root, 99)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::AggregateNotYetExisting { timestamp: 99, .. }
        ));
    }

    #[test]
    fn member_attached_before_its_first_version_is_reported() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteHistoryStore::try_new(&conn).unwrap();
        let interceptor = ChangeInterceptor::new(&store);
        let root = Uuid::new_v4();
        let child = Uuid::new_v4();

        interceptor
            .record_created(root, EntityKind::Root, &summary("issue"), 1)
            .unwrap();
        interceptor
            .record_created(child, EntityKind::Child, &summary("late"), 50)
            .unwrap();
        interceptor.record_attach(root, child, 10).unwrap();

        let view = PointInTimeResolver::new(&store)
            .reconstruct(root, 20)
            .unwrap();
        assert!(view.children.is_empty());
        assert_eq!(view.inconsistencies.len(), 1);
        assert_eq!(view.inconsistencies[0].child_id, child);
        assert_eq!(
            view.inconsistencies[0].kind,
            InconsistencyKind::AttachedBeforeFirstVersion
        );

        let later = PointInTimeResolver::new(&store)
            .reconstruct(root, 60)
            .unwrap();
        assert_eq!(later.child_ids(), vec![child]);
        assert!(later.inconsistencies.is_empty());
    }

    #[test]
    fn reconstruct_rejects_child_ids() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteHistoryStore::try_new(&conn).unwrap();
        let child = Uuid::new_v4();
        ChangeInterceptor::new(&store)
            .record_created(child, EntityKind::Child, &summary("t"), 1)
            .unwrap();

        let err = PointInTimeResolver::new(&store)
            .reconstruct(child, 5)
            .unwrap_err();
        assert!(matches!(err, EngineError::WrongEntityKind { .. }));
    }

    #[test]
    fn reconstruct_version_undoes_same_instant_membership_changes() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteHistoryStore::try_new(&conn).unwrap();
        let interceptor = ChangeInterceptor::new(&store);
        let root = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let added = Uuid::new_v4();

        interceptor
            .record_created(root, EntityKind::Root, &summary("issue"), 1)
            .unwrap();
        interceptor
            .record_created(kept, EntityKind::Child, &summary("kept"), 1)
            .unwrap();
        interceptor
            .record_created(added, EntityKind::Child, &summary("added"), 1)
            .unwrap();
        let attached = interceptor.record_attach(root, kept, 5).unwrap();
        interceptor.record_detach(root, kept, 5).unwrap();
        interceptor.record_attach(root, added, 5).unwrap();

        let resolver = PointInTimeResolver::new(&store);
        let at_attach = resolver
            .reconstruct_version(root, attached.root_version.index)
            .unwrap();
        assert_eq!(at_attach.root_index, 2);
        assert_eq!(at_attach.child_ids(), vec![kept]);
        assert!(at_attach.inconsistencies.is_empty());

        let at_instant = resolver.reconstruct(root, 5).unwrap();
        assert_eq!(at_instant.child_ids(), vec![added]);
        assert_eq!(
            resolver.reconstruct_version(root, 4).unwrap(),
            at_instant
        );
    }

    #[test]
    fn reconstruct_version_drops_child_updates_cascaded_after_it() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteHistoryStore::try_new(&conn).unwrap();
        let interceptor = ChangeInterceptor::new(&store);
        let root = Uuid::new_v4();
        let child = Uuid::new_v4();

        interceptor
            .record_created(root, EntityKind::Root, &summary("draft"), 100)
            .unwrap();
        interceptor
            .record_created(child, EntityKind::Child, &summary("first"), 200)
            .unwrap();
        interceptor.record_attach(root, child, 200).unwrap();
        interceptor
            .record_attribute_change(child, &summary("second"), 200)
            .unwrap();
        interceptor
            .record_attribute_change(root, &summary("final"), 200)
            .unwrap();

        let view = PointInTimeResolver::new(&store)
            .reconstruct_version(root, 2)
            .unwrap();
        assert_eq!(view.root, summary("draft"));
        assert_eq!(view.children.len(), 1);
        assert_eq!(view.children[0].attributes, summary("first"));
        assert_eq!(view.children[0].version_index, 1);
    }
}
