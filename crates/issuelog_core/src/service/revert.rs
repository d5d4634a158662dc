//! Revert engine.
//!
//! # Responsibility
//! - Restore a root and its children to the content captured by one of the
//!   root's historical versions.
//!
//! # Invariants
//! - History is never rewritten: every restoration is a new forward version
//!   stamped with one shared "now".
//! - The whole revert runs inside one write scope (the revert-scope lock);
//!   any failure after the target is resolved rolls everything back and
//!   surfaces `InconsistentRevert`.
//! - "Now" is never earlier than a record the revert appends after, so a
//!   lagging clock cannot make the revert fail on ordering.

use crate::clock::{Clock, Timestamp};
use crate::model::aggregate::{AggregateView, RevertedAggregate};
use crate::model::entity::{Attributes, EntityId};
use crate::repo::store::HistoryStore;
use crate::service::error::{EngineError, EngineResult};
use crate::service::interceptor::ChangeInterceptor;
use crate::service::resolver::{reconstruct_in, reconstruct_version_in};
use log::{error, info};
use std::collections::BTreeSet;
use std::time::Instant;

pub struct RevertEngine<'s, S: HistoryStore, C: Clock> {
    store: &'s S,
    clock: &'s C,
}

/// Differences between the current aggregate and the target reconstruction.
struct RevertPlan {
    root_changed: bool,
    detach: Vec<EntityId>,
    attach: Vec<EntityId>,
    retained: Vec<EntityId>,
}

impl<'s, S: HistoryStore, C: Clock> RevertEngine<'s, S, C> {
    pub fn new(store: &'s S, clock: &'s C) -> Self {
        Self { store, clock }
    }

    /// Reverts `root_id` and its children to root version `target_index`.
    pub fn revert(&self, root_id: EntityId, target_index: u32) -> EngineResult<RevertedAggregate> {
        let started_at = Instant::now();
        info!(
            "event=revert module=revert status=start root_id={} target_index={}",
            root_id, target_index
        );

        let result = self
            .store
            .write_scope(|store| self.revert_in(store, root_id, target_index));

        match &result {
            Ok(reverted) => info!(
                "event=revert module=revert status=ok root_id={} target_index={} root_index={} detached={} attached={} updated_children={} root_changed={} duration_ms={}",
                root_id,
                target_index,
                reverted.root_index,
                reverted.detached.len(),
                reverted.attached.len(),
                reverted.updated_children.len(),
                reverted.root_changed,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=revert module=revert status=error root_id={} target_index={} duration_ms={} error={}",
                root_id,
                target_index,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn revert_in(
        &self,
        store: &S,
        root_id: EntityId,
        target_index: u32,
    ) -> EngineResult<RevertedAggregate> {
        let target = reconstruct_version_in(store, root_id, target_index)?;

        if !target.inconsistencies.is_empty() {
            return Err(inconsistent(
                root_id,
                target_index,
                format!(
                    "{} member(s) cannot be resolved at {}",
                    target.inconsistencies.len(),
                    target.as_of
                ),
                None,
            ));
        }

        self.apply(store, &target, target_index)
            .map_err(|err| match err {
                already @ EngineError::InconsistentRevert { .. } => already,
                other => inconsistent(
                    root_id,
                    target_index,
                    "a restoration step failed".to_string(),
                    Some(other),
                ),
            })
    }

    fn apply(
        &self,
        store: &S,
        target: &AggregateView,
        target_index: u32,
    ) -> EngineResult<RevertedAggregate> {
        let root_id = target.root_id;
        let interceptor = ChangeInterceptor::new(store);
        let current_root = store.latest(root_id)?;
        let plan = plan_revert(store, target, &current_root.attributes)?;
        let now = self.revert_instant(store, current_root.created_at, target)?;

        if plan.root_changed {
            interceptor.record_attribute_change(root_id, &target.root, now)?;
        }

        for child_id in &plan.detach {
            interceptor.record_detach(root_id, *child_id, now)?;
        }

        let mut updated_children = Vec::new();
        for child_id in &plan.attach {
            interceptor.record_attach(root_id, *child_id, now)?;
            if restore_child(&interceptor, store, target, *child_id, now)? {
                updated_children.push(*child_id);
            }
        }

        for child_id in &plan.retained {
            if restore_child(&interceptor, store, target, *child_id, now)? {
                updated_children.push(*child_id);
            }
        }

        let view = reconstruct_in(store, root_id, now)?;
        let root_index = store.latest(root_id)?.index;

        Ok(RevertedAggregate {
            root_id,
            target_index,
            target_timestamp: target.as_of,
            reverted_at: now,
            root_changed: plan.root_changed,
            detached: plan.detach,
            attached: plan.attach,
            updated_children,
            root_index,
            view,
        })
    }

    /// Clock time raised to the newest record the revert will follow.
    fn revert_instant(
        &self,
        store: &S,
        root_latest: Timestamp,
        target: &AggregateView,
    ) -> EngineResult<Timestamp> {
        let mut now = self.clock.now_ms().max(root_latest);
        for child in &target.children {
            now = now.max(store.latest(child.child_id)?.created_at);
            if let Some(detached_at) = store.last_detached_at(child.child_id)? {
                now = now.max(detached_at);
            }
        }
        Ok(now)
    }
}

fn plan_revert<S: HistoryStore>(
    store: &S,
    target: &AggregateView,
    current_root: &Attributes,
) -> EngineResult<RevertPlan> {
    let current_members = store.current_members(target.root_id)?;
    let target_members: BTreeSet<EntityId> = target.child_ids().into_iter().collect();

    Ok(RevertPlan {
        root_changed: *current_root != target.root,
        detach: current_members
            .difference(&target_members)
            .copied()
            .collect(),
        attach: target_members
            .difference(&current_members)
            .copied()
            .collect(),
        retained: target_members
            .intersection(&current_members)
            .copied()
            .collect(),
    })
}

/// Rewrites a child's attributes when they differ from the target snapshot.
fn restore_child<S: HistoryStore>(
    interceptor: &ChangeInterceptor<'_, S>,
    store: &S,
    target: &AggregateView,
    child_id: EntityId,
    now: Timestamp,
) -> EngineResult<bool> {
    let Some(snapshot) = target.child(child_id) else {
        return Ok(false);
    };
    let current = store.latest(child_id)?;
    if current.attributes == snapshot.attributes {
        return Ok(false);
    }
    interceptor.record_attribute_change(child_id, &snapshot.attributes, now)?;
    Ok(true)
}

fn inconsistent(
    root_id: EntityId,
    target_index: u32,
    reason: String,
    cause: Option<EngineError>,
) -> EngineError {
    EngineError::InconsistentRevert {
        root_id,
        target_index,
        reason,
        cause: cause.map(Box::new),
    }
}
