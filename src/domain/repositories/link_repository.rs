//! Repository traits for short link data access.

use crate::domain::entities::{Link, NewLink};
use crate::error::AppError;
use async_trait::async_trait;

/// Existence check used by [`crate::domain::code_allocator::CodeAllocator`].
///
/// The answer is advisory: another request may insert the same code between
/// the check and its own insert. The authoritative guarantee is the uniqueness
/// constraint behind [`LinkRepository::create`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeExistence: Send + Sync {
    /// Returns `true` if a non-deleted link already uses `code`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] or [`AppError::Internal`] on storage errors.
    async fn link_exists_by_code(&self, code: &str) -> Result<bool, AppError>;
}

/// Repository interface for storing and resolving short links.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::MemoryLinkRepository`] - In-memory implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Creates a new short link.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Conflict`] if a non-deleted link already holds the
    /// code. Implementations must enforce this atomically with the insert.
    ///
    /// Returns [`AppError::Unavailable`] or [`AppError::Internal`] on storage errors.
    async fn create(&self, new_link: NewLink) -> Result<Link, AppError>;

    /// Finds a non-deleted link by its short code.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] or [`AppError::Internal`] on storage errors.
    async fn find_by_code(&self, code: &str) -> Result<Option<Link>, AppError>;
}
