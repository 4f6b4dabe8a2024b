//! In-memory implementation of the link repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::domain::entities::{Link, NewLink};
use crate::domain::event::LinkId;
use crate::domain::repositories::{CodeExistence, LinkRepository};
use crate::error::AppError;

/// Name reported for uniqueness violations on the code column.
pub const CODE_UNIQUE_CONSTRAINT: &str = "links_code_key";

#[derive(Default)]
struct LinkTable {
    last_id: LinkId,
    links: HashMap<LinkId, Link>,
    /// Codes of non-deleted links.
    active_codes: HashMap<String, LinkId>,
}

/// Link store kept in process memory.
///
/// Enforces the same constraint a relational store would: a code is unique
/// among non-deleted links, checked atomically with the insert. Soft-deleted
/// links keep their row but release their code.
#[derive(Default)]
pub struct MemoryLinkRepository {
    table: Mutex<LinkTable>,
}

impl MemoryLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds a link by id, including soft-deleted ones.
    pub fn find_by_id(&self, id: LinkId) -> Option<Link> {
        self.table.lock().links.get(&id).cloned()
    }

    /// Soft-deletes a link and frees its code.
    ///
    /// Returns `false` if the link does not exist or is already deleted.
    pub fn soft_delete(&self, id: LinkId) -> bool {
        let mut table = self.table.lock();

        let Some(link) = table.links.get_mut(&id) else {
            return false;
        };
        if link.is_deleted() {
            return false;
        }

        let now = Utc::now();
        link.deleted_at = Some(now);
        link.updated_at = now;
        let code = link.code.clone();
        table.active_codes.remove(&code);

        true
    }

    /// Number of non-deleted links.
    pub fn count_active(&self) -> usize {
        self.table.lock().active_codes.len()
    }
}

#[async_trait]
impl LinkRepository for MemoryLinkRepository {
    async fn create(&self, new_link: NewLink) -> Result<Link, AppError> {
        let mut table = self.table.lock();

        if table.active_codes.contains_key(&new_link.code) {
            return Err(AppError::conflict(
                "Unique constraint violation",
                Some(CODE_UNIQUE_CONSTRAINT),
            ));
        }

        table.last_id += 1;
        let link = Link::new(table.last_id, new_link.url, new_link.code, Utc::now());

        table.active_codes.insert(link.code.clone(), link.id);
        table.links.insert(link.id, link.clone());

        Ok(link)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Link>, AppError> {
        let table = self.table.lock();

        Ok(table
            .active_codes
            .get(code)
            .and_then(|id| table.links.get(id))
            .cloned())
    }
}

#[async_trait]
impl CodeExistence for MemoryLinkRepository {
    async fn link_exists_by_code(&self, code: &str) -> Result<bool, AppError> {
        Ok(self.table.lock().active_codes.contains_key(code))
    }
}
