//! Lazy, restartable iteration over one entity's versions.

use crate::model::entity::EntityId;
use crate::model::version::Version;
use crate::repo::store::RepoResult;
use crate::repo::version_repo::VersionLog;
use std::collections::VecDeque;

/// Pages through versions in index order, fetching `page_size` rows at a time.
///
/// Finite: iteration stops at the newest version present when the last page
/// was fetched. Yields the storage error once and then stops if a page fails.
pub struct VersionHistory<'log, V: VersionLog> {
    log: &'log V,
    entity_id: EntityId,
    page_size: u32,
    cursor: u32,
    buffer: VecDeque<Version>,
    exhausted: bool,
}

impl<'log, V: VersionLog> VersionHistory<'log, V> {
    pub fn new(log: &'log V, entity_id: EntityId, page_size: u32) -> Self {
        Self {
            log,
            entity_id,
            page_size: page_size.max(1),
            cursor: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Rewinds to index 1; the next call re-reads from storage.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fill(&mut self) -> RepoResult<()> {
        let page = self
            .log
            .versions_after(self.entity_id, self.cursor, self.page_size)?;
        if (page.len() as u32) < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = last.index;
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<V: VersionLog> Iterator for VersionHistory<'_, V> {
    type Item = RepoResult<Version>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
