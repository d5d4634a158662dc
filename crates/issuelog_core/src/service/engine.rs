//! History engine facade.
//!
//! # Responsibility
//! - Expose the boundary used by higher layers: change notifications,
//!   history queries, reconstruction and revert.
//! - Wire the interceptor, resolver and revert engine to one store and clock.
//!
//! # Invariants
//! - Current state is `reconstruct(root, now)`; no separate cache exists.
//! - Every notification goes through the change interceptor.

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::config::{normalize_page_size, EngineConfig};
use crate::model::aggregate::{AggregateView, RevertedAggregate};
use crate::model::entity::{Attributes, EntityId, EntityKind};
use crate::model::version::{MembershipInterval, Version};
use crate::repo::history::VersionHistory;
use crate::repo::store::HistoryStore;
use crate::service::error::EngineResult;
use crate::service::interceptor::{
    require_entity, require_kind, ChangeInterceptor, MembershipChange,
};
use crate::service::resolver::PointInTimeResolver;
use crate::service::revert::RevertEngine;

/// Temporal versioning engine over one history store.
pub struct HistoryEngine<S: HistoryStore, C: Clock = SystemClock> {
    store: S,
    clock: C,
    page_size: u32,
}

impl<S: HistoryStore> HistoryEngine<S, SystemClock> {
    /// Creates an engine stamping reverts with wall-clock time.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: HistoryStore, C: Clock> HistoryEngine<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            page_size: normalize_page_size(None),
        }
    }

    /// Applies the paging settings from `config`.
    pub fn configured(mut self, config: &EngineConfig) -> Self {
        self.page_size = config.page_size();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn interceptor(&self) -> ChangeInterceptor<'_, S> {
        ChangeInterceptor::new(&self.store)
    }

    pub fn resolver(&self) -> PointInTimeResolver<'_, S> {
        PointInTimeResolver::new(&self.store)
    }

    pub fn revert_engine(&self) -> RevertEngine<'_, S, C> {
        RevertEngine::new(&self.store, &self.clock)
    }

    /// Entity created: registers it and records version 1.
    pub fn notify_created(
        &self,
        entity_id: EntityId,
        kind: EntityKind,
        attributes: &Attributes,
        timestamp: Timestamp,
    ) -> EngineResult<Version> {
        self.interceptor()
            .record_created(entity_id, kind, attributes, timestamp)
    }

    pub fn notify_attribute_changed(
        &self,
        entity_id: EntityId,
        new_attributes: &Attributes,
        timestamp: Timestamp,
    ) -> EngineResult<Version> {
        self.interceptor()
            .record_attribute_change(entity_id, new_attributes, timestamp)
    }

    pub fn notify_child_attached(
        &self,
        root_id: EntityId,
        child_id: EntityId,
        timestamp: Timestamp,
    ) -> EngineResult<MembershipChange> {
        self.interceptor().record_attach(root_id, child_id, timestamp)
    }

    pub fn notify_child_removed(
        &self,
        root_id: EntityId,
        child_id: EntityId,
        timestamp: Timestamp,
    ) -> EngineResult<MembershipChange> {
        self.interceptor().record_detach(root_id, child_id, timestamp)
    }

    /// Lazy, restartable iteration over the entity's versions.
    pub fn query_history(&self, entity_id: EntityId) -> EngineResult<VersionHistory<'_, S>> {
        require_entity(&self.store, entity_id)?;
        Ok(VersionHistory::new(&self.store, entity_id, self.page_size))
    }

    pub fn version_by_index(&self, entity_id: EntityId, index: u32) -> EngineResult<Version> {
        Ok(self.store.version_by_index(entity_id, index)?)
    }

    pub fn latest(&self, entity_id: EntityId) -> EngineResult<Version> {
        Ok(self.store.latest(entity_id)?)
    }

    pub fn reconstruct(
        &self,
        root_id: EntityId,
        timestamp: Timestamp,
    ) -> EngineResult<AggregateView> {
        self.resolver().reconstruct(root_id, timestamp)
    }

    /// Aggregate exactly as root version `index` recorded it.
    pub fn reconstruct_version(
        &self,
        root_id: EntityId,
        index: u32,
    ) -> EngineResult<AggregateView> {
        self.resolver().reconstruct_version(root_id, index)
    }

    /// Aggregate as it stands now.
    ///
    /// Every event beneath a root cascades onto its timeline, so the root's
    /// newest timestamp bounds everything relevant; "now" is raised to it
    /// when the clock lags.
    pub fn current_view(&self, root_id: EntityId) -> EngineResult<AggregateView> {
        self.store.read_scope(|store| {
            require_kind(store, root_id, EntityKind::Root)?;
            let root_latest = store.latest(root_id)?.created_at;
            let now = self.clock.now_ms().max(root_latest);
            PointInTimeResolver::new(store).reconstruct(root_id, now)
        })
    }

    pub fn revert(&self, root_id: EntityId, target_index: u32) -> EngineResult<RevertedAggregate> {
        self.revert_engine().revert(root_id, target_index)
    }

    /// Every membership interval recorded on the root.
    pub fn membership_history(&self, root_id: EntityId) -> EngineResult<Vec<MembershipInterval>> {
        require_kind(&self.store, root_id, EntityKind::Root)?;
        Ok(self.store.intervals(root_id)?)
    }
}
