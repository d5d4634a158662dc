use issuelog_core::db::open_db_in_memory;
use issuelog_core::{
    Attributes, EngineConfig, EngineError, EntityId, EntityKind, HistoryEngine, ManualClock,
    MembershipTracker, SqliteHistoryStore, Version, VersionEvent, VersionLog,
};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

type Engine<'conn> = HistoryEngine<SqliteHistoryStore<'conn>, ManualClock>;

fn engine(conn: &Connection) -> Engine<'_> {
    let store = SqliteHistoryStore::try_new(conn).unwrap();
    HistoryEngine::with_clock(store, ManualClock::new(0))
}

fn attrs(value: &str) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("text".to_string(), json!(value));
    attributes
}

fn create(engine: &Engine<'_>, kind: EntityKind, text: &str, at: i64) -> EntityId {
    let id = Uuid::new_v4();
    engine.notify_created(id, kind, &attrs(text), at).unwrap();
    id
}

fn collect_history(engine: &Engine<'_>, entity_id: EntityId) -> Vec<Version> {
    engine
        .query_history(entity_id)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn history_is_dense_and_lazy_across_pages() {
    let conn = open_db_in_memory().unwrap();
    let config = EngineConfig {
        history_page_size: 2,
        ..EngineConfig::default()
    };
    let engine = engine(&conn).configured(&config);
    let root = create(&engine, EntityKind::Root, "v1", 10);
    for step in 2..=5 {
        engine
            .notify_attribute_changed(root, &attrs(&format!("v{step}")), 10 * step)
            .unwrap();
    }

    let mut history = engine.query_history(root).unwrap();
    let first_pass: Vec<u32> = history.by_ref().map(|v| v.unwrap().index).collect();
    assert_eq!(first_pass, vec![1, 2, 3, 4, 5]);

    history.restart();
    let second_pass: Vec<Version> = history.map(|v| v.unwrap()).collect();
    assert_eq!(second_pass.len(), 5);
    assert_eq!(second_pass[0].event, VersionEvent::Create);
    assert_eq!(second_pass[4].attributes, attrs("v5"));
    assert!(second_pass
        .windows(2)
        .all(|pair| pair[0].created_at <= pair[1].created_at));
}

#[test]
fn query_history_of_unknown_entity_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);

    let err = engine.query_history(Uuid::new_v4()).err().unwrap();
    assert!(err.is_not_found());
}

#[test]
fn creating_the_same_entity_twice_fails() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "issue", 1);

    let err = engine
        .notify_created(root, EntityKind::Root, &attrs("again"), 2)
        .unwrap_err();
    assert!(matches!(err, EngineError::EntityAlreadyExists(id) if id == root));
    assert_eq!(collect_history(&engine, root).len(), 1);
}

#[test]
fn child_events_cascade_one_root_version_each() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "issue", 1);
    let child = create(&engine, EntityKind::Child, "thesis", 2);

    engine.notify_child_attached(root, child, 3).unwrap();
    engine.notify_attribute_changed(child, &attrs("thesis v2"), 4).unwrap();
    engine.notify_attribute_changed(child, &attrs("thesis v3"), 4).unwrap();
    engine.notify_child_removed(root, child, 5).unwrap();

    let history = collect_history(&engine, root);
    let events: Vec<VersionEvent> = history.iter().map(|v| v.event).collect();
    assert_eq!(
        events,
        vec![
            VersionEvent::Create,
            VersionEvent::ChildAttached,
            VersionEvent::ChildUpdated,
            VersionEvent::ChildUpdated,
            VersionEvent::ChildDetached,
        ]
    );
    assert!(history[1..].iter().all(|v| v.related_id == Some(child)));
    assert!(history.iter().all(|v| v.attributes == attrs("issue")));
}

#[test]
fn latest_version_is_what_version_at_its_timestamp_returns() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "a", 10);
    engine.notify_attribute_changed(root, &attrs("b"), 20).unwrap();
    engine.notify_attribute_changed(root, &attrs("c"), 20).unwrap();

    let latest = engine.latest(root).unwrap();
    let at = engine.store().version_at(root, latest.created_at).unwrap().unwrap();
    assert_eq!(at, latest);
    assert_eq!(at.index, 3);
}

#[test]
fn membership_follows_half_open_intervals() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "issue", 1);
    let child = create(&engine, EntityKind::Child, "thesis", 1);

    engine.notify_child_attached(root, child, 10).unwrap();
    engine.notify_child_removed(root, child, 20).unwrap();

    let store = engine.store();
    assert!(!store.members_at(root, 9).unwrap().contains(&child));
    assert!(store.members_at(root, 10).unwrap().contains(&child));
    assert!(store.members_at(root, 19).unwrap().contains(&child));
    assert!(!store.members_at(root, 20).unwrap().contains(&child));

    let intervals = engine.membership_history(root).unwrap();
    assert_eq!(intervals.len(), 1);
    assert_eq!(intervals[0].added_at, 10);
    assert_eq!(intervals[0].removed_at, Some(20));
}

#[test]
fn reconstruct_before_and_after_detach() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "issue", 1);
    let child = create(&engine, EntityKind::Child, "thesis", 2);
    engine.notify_child_attached(root, child, 3).unwrap();
    engine.notify_attribute_changed(child, &attrs("thesis v2"), 5).unwrap();
    engine.notify_child_removed(root, child, 8).unwrap();

    let at_four = engine.reconstruct(root, 4).unwrap();
    assert_eq!(at_four.child_ids(), vec![child]);
    assert_eq!(at_four.children[0].attributes, attrs("thesis"));

    let at_six = engine.reconstruct(root, 6).unwrap();
    assert_eq!(at_six.children[0].attributes, attrs("thesis v2"));

    let after = engine.reconstruct(root, 8).unwrap();
    assert!(after.children.is_empty());
    assert_eq!(after.root, attrs("issue"));
}

#[test]
fn reconstruct_is_repeatable() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "issue", 1);
    let first = create(&engine, EntityKind::Child, "one", 2);
    let second = create(&engine, EntityKind::Child, "two", 2);
    engine.notify_child_attached(root, first, 3).unwrap();
    engine.notify_child_attached(root, second, 3).unwrap();

    let left = engine.reconstruct(root, 3).unwrap();
    let right = engine.reconstruct(root, 3).unwrap();
    assert_eq!(left, right);

    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(left.child_ids(), expected);
}

#[test]
fn current_view_tracks_newest_state_even_with_lagging_clock() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "issue", 100);
    let child = create(&engine, EntityKind::Child, "thesis", 100);
    engine.notify_child_attached(root, child, 200).unwrap();

    let view = engine.current_view(root).unwrap();
    assert_eq!(view.as_of, 200);
    assert_eq!(view.child_ids(), vec![child]);

    engine.clock().set(500);
    assert_eq!(engine.current_view(root).unwrap().as_of, 500);
}

#[test]
fn reconstruct_before_creation_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "issue", 100);

    let err = engine.reconstruct(root, 50).unwrap_err();
    assert!(matches!(err, EngineError::AggregateNotYetExisting { .. }));
}

#[test]
fn out_of_order_writes_leave_history_untouched() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let root = create(&engine, EntityKind::Root, "issue", 100);
    let child = create(&engine, EntityKind::Child, "thesis", 10);
    engine.notify_child_attached(root, child, 100).unwrap();

    let err = engine
        .notify_attribute_changed(child, &attrs("late"), 50)
        .unwrap_err();
    assert!(matches!(err, EngineError::OutOfOrderTimestamp { .. }));
    assert_eq!(engine.latest(root).unwrap().index, 2);
    assert_eq!(engine.latest(child).unwrap().index, 1);
}

#[test]
fn child_cannot_belong_to_two_roots() {
    let conn = open_db_in_memory().unwrap();
    let engine = engine(&conn);
    let first_root = create(&engine, EntityKind::Root, "a", 1);
    let second_root = create(&engine, EntityKind::Root, "b", 1);
    let child = create(&engine, EntityKind::Child, "thesis", 1);
    engine.notify_child_attached(first_root, child, 2).unwrap();

    let err = engine
        .notify_child_attached(second_root, child, 3)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::AlreadyAttached { owner_id, .. } if owner_id == first_root
    ));
    assert_eq!(engine.latest(second_root).unwrap().index, 1);

    let err = engine.notify_child_removed(second_root, child, 3).unwrap_err();
    assert!(matches!(err, EngineError::NotAttached { .. }));
}
