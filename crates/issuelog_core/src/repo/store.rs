//! SQLite history store: shared error type, transaction scopes, connection
//! readiness checks.
//!
//! # Responsibility
//! - Own the connection borrowed by the version log and membership tracker.
//! - Provide write scopes (`IMMEDIATE` transactions) and read scopes
//!   (`DEFERRED` transactions) that group several repository calls into one
//!   atomic unit or one consistent snapshot.
//!
//! # Invariants
//! - A scope opened while another transaction is active joins it; the
//!   outermost scope decides commit or rollback.
//! - Any error returned from a scope's work rolls the whole scope back.
//! - The store refuses connections that are not migrated to the latest schema.

use crate::clock::Timestamp;
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::entity::{EntityId, EntityKind};
use crate::repo::membership_repo::MembershipTracker;
use crate::repo::version_repo::VersionLog;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage-level error for history persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted into a valid record.
    InvalidData(String),
    /// Entity id has never been registered.
    EntityNotFound(EntityId),
    /// Entity id is already registered.
    EntityAlreadyExists(EntityId),
    /// Entity exists but has no version with this index.
    VersionNotFound { entity_id: EntityId, index: u32 },
    /// Write is older than the newest record it would follow.
    OutOfOrderTimestamp {
        entity_id: EntityId,
        latest: Timestamp,
        attempted: Timestamp,
    },
    /// Child already has an open interval (on `owner_id`).
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
    /// A concurrent writer claimed the same version index first.
    IndexCollision { entity_id: EntityId, index: u32 },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "history store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "history store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted history data: {message}"),
            Self::EntityNotFound(id) => write!(f, "entity not found: {id}"),
            Self::EntityAlreadyExists(id) => write!(f, "entity already exists: {id}"),
            Self::VersionNotFound { entity_id, index } => {
                write!(f, "version {index} not found for entity {entity_id}")
            }
            Self::OutOfOrderTimestamp {
                entity_id,
                latest,
                attempted,
            } => write!(
                f,
                "timestamp {attempted} is earlier than latest {latest} recorded for {entity_id}"
            ),
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
            Self::IndexCollision { entity_id, index } => write!(
                f,
                "version index {index} for entity {entity_id} was claimed concurrently"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable store the engine appends to and queries.
///
/// Scopes take the store back as an argument so the work closure can call
/// both the version log and the membership tracker inside one transaction.
pub trait HistoryStore: VersionLog + MembershipTracker {
    /// Runs `work` as one atomic write unit.
    fn write_scope<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<RepoError>;

    /// Runs `work` against one consistent read snapshot.
    fn read_scope<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<RepoError>;
}

/// SQLite-backed history store.
pub struct SqliteHistoryStore<'conn> {
    pub(crate) conn: &'conn Connection,
}

impl<'conn> SqliteHistoryStore<'conn> {
    /// Creates store from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_history_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn scoped<T, E>(
        &self,
        behavior: TransactionBehavior,
        work: impl FnOnce(&Self) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepoError>,
    {
        if !self.conn.is_autocommit() {
            return work(self);
        }

        let tx = Transaction::new_unchecked(self.conn, behavior).map_err(RepoError::from)?;
        // Dropping `tx` on the error path rolls back.
        let value = work(self)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}

impl HistoryStore for SqliteHistoryStore<'_> {
    fn write_scope<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<RepoError>,
    {
        self.scoped(TransactionBehavior::Immediate, work)
    }

    fn read_scope<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        E: From<RepoError>,
    {
        self.scoped(TransactionBehavior::Deferred, work)
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_kind(value: &str) -> RepoResult<EntityKind> {
    EntityKind::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid kind `{value}` in entities.kind")))
}

fn ensure_history_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["entities", "versions", "memberships"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

#[cfg(test)]
mod tests {
    use super::{HistoryStore, RepoError, SqliteHistoryStore};
    use crate::db::open_db_in_memory;
    use crate::model::entity::EntityKind;
    use crate::repo::version_repo::VersionLog;
    use rusqlite::Connection;
    use uuid::Uuid;

    #[test]
    fn unmigrated_connection_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteHistoryStore::try_new(&conn).err().unwrap();
        assert!(matches!(
            err,
            RepoError::UninitializedConnection {
                actual_version: 0,
                ..
            }
        ));
    }

    #[test]
    fn failed_write_scope_rolls_back() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteHistoryStore::try_new(&conn).unwrap();
        let id = Uuid::new_v4();

        let result: Result<(), RepoError> = store.write_scope(|store| {
            store.register_entity(id, EntityKind::Root, 10)?;
            Err(RepoError::InvalidData("forced".to_string()))
        });
        assert!(result.is_err());
        assert!(conn.is_autocommit());
        assert_eq!(store.entity_kind(id).unwrap(), None);
    }

    #[test]
    fn nested_scopes_join_the_outer_transaction() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteHistoryStore::try_new(&conn).unwrap();
        let id = Uuid::new_v4();

        let result: Result<(), RepoError> = store.write_scope(|outer| {
            outer.write_scope(|inner| inner.register_entity(id, EntityKind::Child, 5))?;
            Err(RepoError::InvalidData("abort outer".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.entity_kind(id).unwrap(), None);
    }
}
