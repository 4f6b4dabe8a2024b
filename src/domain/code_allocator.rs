//! Collision-avoiding short code allocation.
//!
//! The allocator draws random candidates and asks the store whether each one is
//! taken. It holds no mutable state, so any number of creation requests can
//! allocate concurrently without a shared lock.
//!
//! The existence check and the eventual insert are two separate operations, so
//! a code reported free can still be claimed by a concurrent request before it
//! is committed. The store's uniqueness constraint is what actually guarantees
//! uniqueness; the creation path reacts to a constraint violation by
//! allocating again (see
//! [`crate::application::services::LinkService::create_short_link`]).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::repositories::CodeExistence;
use crate::error::AppError;
use crate::utils::code_generator::{
    CodeAlphabet, DEFAULT_CODE_LENGTH, code_space_size, generate_code,
};

/// Default number of candidates tried per allocation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Shape of generated codes and the per-allocation attempt budget.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    pub alphabet: CodeAlphabet,
    pub code_length: usize,
    /// Existence checks performed before giving up with
    /// [`AppError::CodeSpaceExhausted`].
    pub max_attempts: u32,
}

impl AllocatorConfig {
    /// Number of distinct codes this configuration can produce.
    pub fn code_space(&self) -> f64 {
        code_space_size(&self.alphabet, self.code_length)
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            alphabet: CodeAlphabet::default(),
            code_length: DEFAULT_CODE_LENGTH,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Generates short codes that are free at the time of the check.
pub struct CodeAllocator<C: CodeExistence + ?Sized> {
    lookup: Arc<C>,
    config: AllocatorConfig,
}

impl<C: CodeExistence + ?Sized> Clone for CodeAllocator<C> {
    fn clone(&self) -> Self {
        Self {
            lookup: self.lookup.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C: CodeExistence + ?Sized> CodeAllocator<C> {
    pub fn new(lookup: Arc<C>, config: AllocatorConfig) -> Self {
        Self { lookup, config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Draws one candidate without checking it.
    pub fn candidate(&self) -> String {
        generate_code(&self.config.alphabet, self.config.code_length)
    }

    /// Allocates a code that no non-deleted link uses right now.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::CodeSpaceExhausted`] after `max_attempts` taken
    /// candidates. Storage errors from the existence check are returned as-is.
    pub async fn allocate(&self) -> Result<String, AppError> {
        self.allocate_cancellable(&CancellationToken::new()).await
    }

    /// Like [`Self::allocate`], but gives up as soon as `cancel` fires.
    ///
    /// Cancellation is checked before every draw and raced against every
    /// in-flight existence check.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cancelled`] once `cancel` is cancelled, otherwise
    /// the same errors as [`Self::allocate`].
    pub async fn allocate_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let candidate = self.candidate();

            let taken = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                taken = self.lookup.link_exists_by_code(&candidate) => taken?,
            };

            if !taken {
                debug!(attempt, code = %candidate, "Short code allocated");
                return Ok(candidate);
            }

            debug!(attempt, code = %candidate, "Short code collision");
            metrics::counter!("code_collisions_total").increment(1);
        }

        warn!(max_attempts, "Short code allocation exhausted");
        metrics::counter!("code_allocation_exhausted_total").increment(1);

        Err(AppError::code_space_exhausted(max_attempts))
    }
}
