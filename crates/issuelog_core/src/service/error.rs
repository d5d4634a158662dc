//! Engine-level error taxonomy.
//!
//! Storage-level `RepoError`s are translated into their semantic engine
//! counterpart; transport failures stay wrapped in `Repo`.

use crate::clock::Timestamp;
use crate::model::entity::{EntityId, EntityKind};
use crate::repo::store::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EngineResult<T> = Result<T, EngineError>;

/// Typed failures surfaced by interception, reconstruction and revert.
#[derive(Debug)]
pub enum EngineError {
    /// Write is older than the newest record it would follow.
    OutOfOrderTimestamp {
        entity_id: EntityId,
        latest: Timestamp,
        attempted: Timestamp,
    },
    /// Entity id is unknown.
    EntityNotFound(EntityId),
    /// Entity exists but the version index does not.
    VersionNotFound { entity_id: EntityId, index: u32 },
    /// Entity id was already created.
    EntityAlreadyExists(EntityId),
    /// Child already has an open interval on `owner_id`.
    AlreadyAttached {
        root_id: EntityId,
        child_id: EntityId,
        owner_id: EntityId,
    },
    /// No open interval exists for the pair.
    NotAttached {
        root_id: EntityId,
        child_id: EntityId,
    },
    /// Operation needs the other entity kind.
    WrongEntityKind {
        entity_id: EntityId,
        expected: EntityKind,
        actual: EntityKind,
    },
    /// Reconstruction requested before the root's first version.
    AggregateNotYetExisting {
        root_id: EntityId,
        timestamp: Timestamp,
    },
    /// A revert could not be applied as one unit; nothing was written.
    InconsistentRevert {
        root_id: EntityId,
        target_index: u32,
        reason: String,
        cause: Option<Box<EngineError>>,
    },
    /// Storage transport or data failure.
    Repo(RepoError),
}

impl EngineError {
    /// Whether the failure names a missing entity or version.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntityNotFound(_) | Self::VersionNotFound { .. }
        )
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfOrderTimestamp {
                entity_id,
                latest,
                attempted,
            } => write!(
                f,
                "out-of-order timestamp for {entity_id}: {attempted} is earlier than {latest}"
            ),
            Self::EntityNotFound(id) => write!(f, "entity not found: {id}"),
            Self::VersionNotFound { entity_id, index } => {
                write!(f, "version {index} not found for entity {entity_id}")
            }
            Self::EntityAlreadyExists(id) => write!(f, "entity already exists: {id}"),
            Self::AlreadyAttached {
                root_id,
                child_id,
                owner_id,
            } => write!(
                f,
                "child {child_id} cannot attach to {root_id}: already attached to {owner_id}"
            ),
            Self::NotAttached { root_id, child_id } => {
                write!(f, "child {child_id} is not attached to {root_id}")
            }
            Self::WrongEntityKind {
                entity_id,
                expected,
                actual,
            } => write!(
                f,
                "entity {entity_id} is a {} but a {} is required",
                actual.as_str(),
                expected.as_str()
            ),
            Self::AggregateNotYetExisting { root_id, timestamp } => {
                write!(f, "aggregate {root_id} did not exist yet at {timestamp}")
            }
            Self::InconsistentRevert {
                root_id,
                target_index,
                reason,
                ..
            } => write!(
                f,
                "revert of {root_id} to version {target_index} aborted: {reason}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InconsistentRevert {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::OutOfOrderTimestamp {
                entity_id,
                latest,
                attempted,
            } => Self::OutOfOrderTimestamp {
                entity_id,
                latest,
                attempted,
            },
            RepoError::EntityNotFound(id) => Self::EntityNotFound(id),
            RepoError::VersionNotFound { entity_id, index } => {
                Self::VersionNotFound { entity_id, index }
            }
            RepoError::EntityAlreadyExists(id) => Self::EntityAlreadyExists(id),
            RepoError::AlreadyAttached {
                root_id,
                child_id,
                owner_id,
            } => Self::AlreadyAttached {
                root_id,
                child_id,
                owner_id,
            },
            RepoError::NotAttached { root_id, child_id } => {
                Self::NotAttached { root_id, child_id }
            }
            other => Self::Repo(other),
        }
    }
}
