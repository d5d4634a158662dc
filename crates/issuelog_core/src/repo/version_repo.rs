//! Version log contracts and SQLite implementation.
//!
//! # Responsibility
//! - Register entities and append immutable per-entity versions.
//! - Answer point-in-time, by-index and latest lookups.
//!
//! # Invariants
//! - `append` assigns `last_index + 1`; indices are dense from 1.
//! - `append` rejects timestamps earlier than the entity's latest version.
//! - Several versions may share a timestamp; the highest index wins in
//!   point-in-time lookups.
//! - The `(entity_id, idx)` primary key turns a concurrent index race into
//!   `IndexCollision` instead of a duplicate.

use crate::clock::Timestamp;
use crate::model::entity::{Attributes, EntityId, EntityKind};
use crate::model::version::{Version, VersionEvent};
use crate::repo::store::{parse_kind, parse_uuid, RepoError, RepoResult, SqliteHistoryStore};
use rusqlite::{params, OptionalExtension, Row};

const VERSION_SELECT_SQL: &str = "SELECT
    entity_id,
    idx,
    created_at,
    event,
    related_id,
    attributes
FROM versions";

/// Append-only, per-entity ordered list of snapshots.
pub trait VersionLog {
    /// Registers a new entity id with its kind.
    fn register_entity(
        &self,
        entity_id: EntityId,
        kind: EntityKind,
        created_at: Timestamp,
    ) -> RepoResult<()>;
    /// Kind of a registered entity, `None` when unknown.
    fn entity_kind(&self, entity_id: EntityId) -> RepoResult<Option<EntityKind>>;
    /// Appends the next version for `entity_id`.
    fn append(
        &self,
        entity_id: EntityId,
        attributes: &Attributes,
        timestamp: Timestamp,
        event: VersionEvent,
        related_id: Option<EntityId>,
    ) -> RepoResult<Version>;
    /// Latest version with `created_at <= timestamp`; `None` when the entity
    /// did not exist yet.
    fn version_at(&self, entity_id: EntityId, timestamp: Timestamp)
        -> RepoResult<Option<Version>>;
    /// Every version stamped exactly `timestamp`, ascending by index.
    fn versions_at_instant(&self, entity_id: EntityId, timestamp: Timestamp)
        -> RepoResult<Vec<Version>>;
    /// Direct lookup by 1-based index.
    fn version_by_index(&self, entity_id: EntityId, index: u32) -> RepoResult<Version>;
    /// Newest version of the entity.
    fn latest(&self, entity_id: EntityId) -> RepoResult<Version>;
    /// Up to `limit` versions with index greater than `after_index`, ascending.
    fn versions_after(
        &self,
        entity_id: EntityId,
        after_index: u32,
        limit: u32,
    ) -> RepoResult<Vec<Version>>;
}

impl VersionLog for SqliteHistoryStore<'_> {
    fn register_entity(
        &self,
        entity_id: EntityId,
        kind: EntityKind,
        created_at: Timestamp,
    ) -> RepoResult<()> {
        if self.entity_kind(entity_id)?.is_some() {
            return Err(RepoError::EntityAlreadyExists(entity_id));
        }

        self.conn.execute(
            "INSERT INTO entities (entity_id, kind, created_at)
             VALUES (?1, ?2, ?3);",
            params![entity_id.to_string(), kind.as_str(), created_at],
        )?;
        Ok(())
    }

    fn entity_kind(&self, entity_id: EntityId) -> RepoResult<Option<EntityKind>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT kind
                 FROM entities
                 WHERE entity_id = ?1;",
                [entity_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        value.as_deref().map(parse_kind).transpose()
    }

    fn append(
        &self,
        entity_id: EntityId,
        attributes: &Attributes,
        timestamp: Timestamp,
        event: VersionEvent,
        related_id: Option<EntityId>,
    ) -> RepoResult<Version> {
        if self.entity_kind(entity_id)?.is_none() {
            return Err(RepoError::EntityNotFound(entity_id));
        }

        let last: Option<(u32, Timestamp)> = self
            .conn
            .query_row(
                "SELECT idx, created_at
                 FROM versions
                 WHERE entity_id = ?1
                 ORDER BY idx DESC
                 LIMIT 1;",
                [entity_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let index = match last {
            Some((_, latest)) if timestamp < latest => {
                return Err(RepoError::OutOfOrderTimestamp {
                    entity_id,
                    latest,
                    attempted: timestamp,
                });
            }
            Some((last_index, _)) => last_index + 1,
            None => 1,
        };

        let encoded = serde_json::to_string(attributes).map_err(|err| {
            RepoError::InvalidData(format!("attributes for {entity_id} are not encodable: {err}"))
        })?;

        let inserted = self.conn.execute(
            "INSERT INTO versions (
                entity_id,
                idx,
                created_at,
                event,
                related_id,
                attributes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                entity_id.to_string(),
                index,
                timestamp,
                event.as_str(),
                related_id.map(|value| value.to_string()),
                encoded,
            ],
        );
        if let Err(err) = inserted {
            if is_primary_key_violation(&err) {
                return Err(RepoError::IndexCollision { entity_id, index });
            }
            return Err(err.into());
        }

        Ok(Version {
            entity_id,
            index,
            created_at: timestamp,
            event,
            related_id,
            attributes: attributes.clone(),
        })
    }

    fn version_at(
        &self,
        entity_id: EntityId,
        timestamp: Timestamp,
    ) -> RepoResult<Option<Version>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE entity_id = ?1
               AND created_at <= ?2
             ORDER BY idx DESC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![entity_id.to_string(), timestamp])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_version_row(row)?));
        }
        Ok(None)
    }

    fn versions_at_instant(
        &self,
        entity_id: EntityId,
        timestamp: Timestamp,
    ) -> RepoResult<Vec<Version>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE entity_id = ?1
               AND created_at = ?2
             ORDER BY idx ASC;"
        ))?;
        let mut rows = stmt.query(params![entity_id.to_string(), timestamp])?;
        let mut versions = Vec::new();
        while let Some(row) = rows.next()? {
            versions.push(parse_version_row(row)?);
        }
        Ok(versions)
    }

    fn version_by_index(&self, entity_id: EntityId, index: u32) -> RepoResult<Version> {
        let mut stmt = self.conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE entity_id = ?1
               AND idx = ?2;"
        ))?;
        let mut rows = stmt.query(params![entity_id.to_string(), index])?;
        if let Some(row) = rows.next()? {
            return parse_version_row(row);
        }
        if self.entity_kind(entity_id)?.is_none() {
            return Err(RepoError::EntityNotFound(entity_id));
        }
        Err(RepoError::VersionNotFound { entity_id, index })
    }

    fn latest(&self, entity_id: EntityId) -> RepoResult<Version> {
        let mut stmt = self.conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE entity_id = ?1
             ORDER BY idx DESC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([entity_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return parse_version_row(row);
        }
        Err(RepoError::EntityNotFound(entity_id))
    }

    fn versions_after(
        &self,
        entity_id: EntityId,
        after_index: u32,
        limit: u32,
    ) -> RepoResult<Vec<Version>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VERSION_SELECT_SQL}
             WHERE entity_id = ?1
               AND idx > ?2
             ORDER BY idx ASC
             LIMIT ?3;"
        ))?;
        let mut rows = stmt.query(params![entity_id.to_string(), after_index, limit])?;
        let mut versions = Vec::new();
        while let Some(row) = rows.next()? {
            versions.push(parse_version_row(row)?);
        }
        Ok(versions)
    }
}

fn parse_version_row(row: &Row<'_>) -> RepoResult<Version> {
    let entity_text: String = row.get("entity_id")?;
    let entity_id = parse_uuid(&entity_text, "versions.entity_id")?;

    let event_text: String = row.get("event")?;
    let event = VersionEvent::parse(&event_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid event `{event_text}` in versions.event"))
    })?;

    let related_id = row
        .get::<_, Option<String>>("related_id")?
        .map(|value| parse_uuid(&value, "versions.related_id"))
        .transpose()?;

    let attributes_text: String = row.get("attributes")?;
    let attributes = serde_json::from_str(&attributes_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid attributes json for {entity_id} in versions.attributes: {err}"
        ))
    })?;

    Ok(Version {
        entity_id,
        index: row.get("idx")?,
        created_at: row.get("created_at")?,
        event,
        related_id,
        attributes,
    })
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
