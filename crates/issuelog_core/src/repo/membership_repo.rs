//! Membership tracker contracts and SQLite implementation.
//!
//! # Responsibility
//! - Record when each child was attached to and detached from a root.
//! - Answer "which children belonged to this root at instant t".
//!
//! # Invariants
//! - A child has at most one open interval, across all roots.
//! - Intervals of one child never overlap: a new attach cannot start before
//!   the child's last detach.
//! - An interval covers `[added_at, removed_at)`.

use crate::clock::Timestamp;
use crate::model::entity::EntityId;
use crate::model::version::MembershipInterval;
use crate::repo::store::{parse_uuid, RepoError, RepoResult, SqliteHistoryStore};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeSet;

/// Per-aggregate record of child association intervals.
pub trait MembershipTracker {
    /// Opens a new interval for the pair.
    fn attach(
        &self,
        root_id: EntityId,
        child_id: EntityId,
        at: Timestamp,
    ) -> RepoResult<MembershipInterval>;
    /// Closes the pair's open interval.
    fn detach(
        &self,
        root_id: EntityId,
        child_id: EntityId,
        at: Timestamp,
    ) -> RepoResult<MembershipInterval>;
    /// Children whose interval on `root_id` covers `timestamp`.
    fn members_at(&self, root_id: EntityId, timestamp: Timestamp)
        -> RepoResult<BTreeSet<EntityId>>;
    /// Children with an open interval on `root_id`.
    fn current_members(&self, root_id: EntityId) -> RepoResult<BTreeSet<EntityId>>;
    /// Root currently holding `child_id`, if any.
    fn owner_of(&self, child_id: EntityId) -> RepoResult<Option<EntityId>>;
    /// Every interval ever recorded on `root_id`, ordered by `added_at`.
    fn intervals(&self, root_id: EntityId) -> RepoResult<Vec<MembershipInterval>>;
    /// Latest `removed_at` of `child_id` on any root.
    fn last_detached_at(&self, child_id: EntityId) -> RepoResult<Option<Timestamp>>;
}

impl MembershipTracker for SqliteHistoryStore<'_> {
    fn attach(
        &self,
        root_id: EntityId,
        child_id: EntityId,
        at: Timestamp,
    ) -> RepoResult<MembershipInterval> {
        if let Some(owner_id) = self.owner_of(child_id)? {
            return Err(RepoError::AlreadyAttached {
                root_id,
                child_id,
                owner_id,
            });
        }

        if let Some(latest) = self.last_detached_at(child_id)? {
            if at < latest {
                return Err(RepoError::OutOfOrderTimestamp {
                    entity_id: child_id,
                    latest,
                    attempted: at,
                });
            }
        }

        self.conn.execute(
            "INSERT INTO memberships (root_id, child_id, added_at, removed_at)
             VALUES (?1, ?2, ?3, NULL);",
            params![root_id.to_string(), child_id.to_string(), at],
        )?;

        Ok(MembershipInterval {
            root_id,
            child_id,
            added_at: at,
            removed_at: None,
        })
    }

    fn detach(
        &self,
        root_id: EntityId,
        child_id: EntityId,
        at: Timestamp,
    ) -> RepoResult<MembershipInterval> {
        let open: Option<(i64, Timestamp)> = self
            .conn
            .query_row(
                "SELECT interval_id, added_at
                 FROM memberships
                 WHERE root_id = ?1
                   AND child_id = ?2
                   AND removed_at IS NULL;",
                [root_id.to_string(), child_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((interval_id, added_at)) = open else {
            return Err(RepoError::NotAttached { root_id, child_id });
        };
        if at < added_at {
            return Err(RepoError::OutOfOrderTimestamp {
                entity_id: child_id,
                latest: added_at,
                attempted: at,
            });
        }

        self.conn.execute(
            "UPDATE memberships
             SET removed_at = ?2
             WHERE interval_id = ?1
               AND removed_at IS NULL;",
            params![interval_id, at],
        )?;

        Ok(MembershipInterval {
            root_id,
            child_id,
            added_at,
            removed_at: Some(at),
        })
    }

    fn members_at(
        &self,
        root_id: EntityId,
        timestamp: Timestamp,
    ) -> RepoResult<BTreeSet<EntityId>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT child_id
             FROM memberships
             WHERE root_id = ?1
               AND added_at <= ?2
               AND (removed_at IS NULL OR removed_at > ?2);",
        )?;
        let mut rows = stmt.query(params![root_id.to_string(), timestamp])?;
        let mut members = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            members.insert(parse_uuid(&value, "memberships.child_id")?);
        }
        Ok(members)
    }

    fn current_members(&self, root_id: EntityId) -> RepoResult<BTreeSet<EntityId>> {
        let mut stmt = self.conn.prepare(
            "SELECT child_id
             FROM memberships
             WHERE root_id = ?1
               AND removed_at IS NULL;",
        )?;
        let mut rows = stmt.query([root_id.to_string()])?;
        let mut members = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            members.insert(parse_uuid(&value, "memberships.child_id")?);
        }
        Ok(members)
    }

    fn owner_of(&self, child_id: EntityId) -> RepoResult<Option<EntityId>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT root_id
                 FROM memberships
                 WHERE child_id = ?1
                   AND removed_at IS NULL;",
                [child_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        value
            .map(|text| parse_uuid(&text, "memberships.root_id"))
            .transpose()
    }

    fn intervals(&self, root_id: EntityId) -> RepoResult<Vec<MembershipInterval>> {
        let mut stmt = self.conn.prepare(
            "SELECT root_id, child_id, added_at, removed_at
             FROM memberships
             WHERE root_id = ?1
             ORDER BY added_at ASC, interval_id ASC;",
        )?;
        let mut rows = stmt.query([root_id.to_string()])?;
        let mut intervals = Vec::new();
        while let Some(row) = rows.next()? {
            intervals.push(parse_interval_row(row)?);
        }
        Ok(intervals)
    }

    fn last_detached_at(&self, child_id: EntityId) -> RepoResult<Option<Timestamp>> {
        let value: Option<Timestamp> = self.conn.query_row(
            "SELECT MAX(removed_at)
             FROM memberships
             WHERE child_id = ?1;",
            [child_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(value)
    }
}

fn parse_interval_row(row: &Row<'_>) -> RepoResult<MembershipInterval> {
    let root_text: String = row.get("root_id")?;
    let child_text: String = row.get("child_id")?;
    Ok(MembershipInterval {
        root_id: parse_uuid(&root_text, "memberships.root_id")?,
        child_id: parse_uuid(&child_text, "memberships.child_id")?,
        added_at: row.get("added_at")?,
        removed_at: row.get("removed_at")?,
    })
}
