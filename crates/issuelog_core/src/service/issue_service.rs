//! Issue/thesis use-case service.
//!
//! # Responsibility
//! - Provide the issue-level operations the history exists for: raising
//!   theses, revising and removing them, reading an issue as of an instant
//!   (for example when a vote was cast), and reverting an issue.
//! - Translate typed `Issue`/`Thesis` records to attribute snapshots.
//!
//! # Invariants
//! - Creating a thesis for an issue is one write scope: the thesis exists
//!   and is attached, or neither happened. The issue gains exactly one version.
//! - Typed records are validated before anything is written.

use crate::clock::{Clock, Timestamp};
use crate::model::aggregate::{AggregateView, RevertedAggregate};
use crate::model::entity::{EntityId, EntityKind};
use crate::model::issue::{AttributeError, Issue, Thesis, ThesisPosition};
use crate::repo::store::{HistoryStore, RepoError};
use crate::service::engine::HistoryEngine;
use crate::service::error::EngineError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors from issue use-cases.
#[derive(Debug)]
pub enum IssueServiceError {
    /// Typed record failed validation or a stored snapshot does not project.
    Attribute(AttributeError),
    /// History engine failure.
    Engine(EngineError),
}

impl Display for IssueServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attribute(err) => write!(f, "{err}"),
            Self::Engine(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IssueServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Attribute(err) => Some(err),
            Self::Engine(err) => Some(err),
        }
    }
}

impl From<AttributeError> for IssueServiceError {
    fn from(value: AttributeError) -> Self {
        Self::Attribute(value)
    }
}

impl From<EngineError> for IssueServiceError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<RepoError> for IssueServiceError {
    fn from(value: RepoError) -> Self {
        Self::Engine(value.into())
    }
}

pub type IssueResult<T> = Result<T, IssueServiceError>;

/// One thesis inside an issue snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThesisSnapshot {
    pub thesis_id: EntityId,
    pub thesis: Thesis,
}

/// Typed view of an issue and its theses at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSnapshot {
    pub issue_id: EntityId,
    pub issue: Issue,
    /// Ordered by thesis id.
    pub theses: Vec<ThesisSnapshot>,
    pub as_of: Timestamp,
}

impl IssueSnapshot {
    fn from_view(view: &AggregateView) -> IssueResult<Self> {
        let theses = view
            .children
            .iter()
            .map(|child| {
                Ok(ThesisSnapshot {
                    thesis_id: child.child_id,
                    thesis: Thesis::from_attributes(&child.attributes)?,
                })
            })
            .collect::<Result<Vec<_>, AttributeError>>()?;

        Ok(Self {
            issue_id: view.root_id,
            issue: Issue::from_attributes(&view.root)?,
            theses,
            as_of: view.as_of,
        })
    }

    /// Theses taking `position`.
    pub fn theses_for(&self, position: ThesisPosition) -> Vec<&ThesisSnapshot> {
        self.theses
            .iter()
            .filter(|snapshot| snapshot.thesis.position == position)
            .collect()
    }

    pub fn thesis(&self, thesis_id: EntityId) -> Option<&Thesis> {
        self.theses
            .iter()
            .find(|snapshot| snapshot.thesis_id == thesis_id)
            .map(|snapshot| &snapshot.thesis)
    }
}

/// Issue-level facade over the history engine.
pub struct IssueService<S: HistoryStore, C: Clock> {
    engine: HistoryEngine<S, C>,
}

impl<S: HistoryStore, C: Clock> IssueService<S, C> {
    pub fn new(engine: HistoryEngine<S, C>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &HistoryEngine<S, C> {
        &self.engine
    }

    /// Creates an issue and returns its generated id.
    pub fn create_issue(&self, issue: &Issue, at: Timestamp) -> IssueResult<EntityId> {
        issue.validate()?;
        let issue_id = Uuid::new_v4();
        self.engine
            .notify_created(issue_id, EntityKind::Root, &issue.to_attributes(), at)?;
        Ok(issue_id)
    }

    pub fn update_issue(
        &self,
        issue_id: EntityId,
        issue: &Issue,
        at: Timestamp,
    ) -> IssueResult<()> {
        issue.validate()?;
        self.engine
            .notify_attribute_changed(issue_id, &issue.to_attributes(), at)?;
        Ok(())
    }

    /// Creates a thesis and attaches it to the issue as one unit.
    pub fn create_thesis_for_issue(
        &self,
        issue_id: EntityId,
        thesis: &Thesis,
        at: Timestamp,
    ) -> IssueResult<EntityId> {
        thesis.validate()?;
        let thesis_id = Uuid::new_v4();
        self.engine.store().write_scope(|_| -> IssueResult<()> {
            self.engine
                .notify_created(thesis_id, EntityKind::Child, &thesis.to_attributes(), at)?;
            self.engine.notify_child_attached(issue_id, thesis_id, at)?;
            Ok(())
        })?;
        Ok(thesis_id)
    }

    /// Replaces a thesis's content; its issue gains a cascading version.
    pub fn update_thesis(
        &self,
        thesis_id: EntityId,
        thesis: &Thesis,
        at: Timestamp,
    ) -> IssueResult<()> {
        thesis.validate()?;
        self.engine
            .notify_attribute_changed(thesis_id, &thesis.to_attributes(), at)?;
        Ok(())
    }

    pub fn remove_thesis(
        &self,
        issue_id: EntityId,
        thesis_id: EntityId,
        at: Timestamp,
    ) -> IssueResult<()> {
        self.engine.notify_child_removed(issue_id, thesis_id, at)?;
        Ok(())
    }

    /// Number of versions recorded for the issue.
    pub fn version_count(&self, issue_id: EntityId) -> IssueResult<u32> {
        Ok(self.engine.latest(issue_id)?.index)
    }

    /// The issue and its theses exactly as they stood at `at`.
    pub fn issue_at(&self, issue_id: EntityId, at: Timestamp) -> IssueResult<IssueSnapshot> {
        let view = self.engine.reconstruct(issue_id, at)?;
        IssueSnapshot::from_view(&view)
    }

    pub fn current_issue(&self, issue_id: EntityId) -> IssueResult<IssueSnapshot> {
        let view = self.engine.current_view(issue_id)?;
        IssueSnapshot::from_view(&view)
    }

    pub fn revert_to(&self, issue_id: EntityId, index: u32) -> IssueResult<RevertedAggregate> {
        Ok(self.engine.revert(issue_id, index)?)
    }
}
