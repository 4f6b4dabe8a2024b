//! Link entity representing a shortened URL mapping.

use chrono::{DateTime, Utc};

use crate::domain::event::LinkId;

/// A shortened URL link.
///
/// The core only relies on `id` (click accounting) and `code` (uniqueness).
/// A code is unique among links whose `deleted_at` is unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub url: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Link {
    /// Creates a new, non-deleted link stamped with `created_at`.
    pub fn new(id: LinkId, url: String, code: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            url,
            code,
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    /// Returns true if the link has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input data for creating a new link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub url: String,
    pub code: String,
}
