//! Repository trait for click counters.

use crate::domain::event::LinkId;
use crate::error::AppError;
use async_trait::async_trait;

/// Counter store written by [`crate::domain::click_aggregator::ClickAggregator`].
///
/// Calls arrive concurrently from several workers and may be retried after a
/// transient failure, so an occasional extra increment is acceptable
/// (at-least-once, not exactly-once).
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::MemoryClickRepository`] - In-memory implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClickRepository: Send + Sync {
    /// Adds one click to the counter of `link_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unavailable`] for transient failures worth retrying.
    /// Any other error is treated as permanent for this click.
    async fn increment_click_count(&self, link_id: LinkId) -> Result<(), AppError>;
}
