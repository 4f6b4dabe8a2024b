//! Repository trait definitions for the domain layer.
//!
//! The core never sees how links and counters are stored. It relies on three
//! capabilities:
//!
//! - [`CodeExistence`] - "is this short code taken?"
//! - [`LinkRepository`] - create a link, resolve a code
//! - [`ClickRepository`] - increment a link's click counter
//!
//! Implementations live in `crate::infrastructure::persistence`; mock
//! implementations are generated via `mockall` for unit tests.

pub mod click_repository;
pub mod link_repository;

pub use click_repository::ClickRepository;
pub use link_repository::{CodeExistence, LinkRepository};

#[cfg(test)]
pub use click_repository::MockClickRepository;
#[cfg(test)]
pub use link_repository::{MockCodeExistence, MockLinkRepository};
