//! Error type shared by the core components and the repository traits.

use thiserror::Error;

/// Errors produced by the link, click and allocation paths.
///
/// Repository implementations map their backend failures onto these variants so
/// the core can decide what to retry: [`AppError::Unavailable`] is transient,
/// [`AppError::Conflict`] means a uniqueness constraint rejected a write.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    Conflict {
        message: String,
        constraint: Option<String>,
    },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// No unique short code could be found within the attempt budget.
    #[error("could not allocate a unique short code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{message}")]
    Internal { message: String },
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>, constraint: Option<&str>) -> Self {
        Self::Conflict {
            message: message.into(),
            constraint: constraint.map(str::to_string),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn code_space_exhausted(attempts: u32) -> Self {
        Self::CodeSpaceExhausted { attempts }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for failures worth retrying (store temporarily unavailable).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns true if a uniqueness constraint rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
