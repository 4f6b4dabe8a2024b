//! Repository implementations.
//!
//! The core treats storage as capability traits only. These in-memory
//! implementations back the demo binary and the integration tests; a database
//! adapter implements the same traits.
//!
//! # Repositories
//!
//! - [`MemoryLinkRepository`] - Links with a unique-code constraint
//! - [`MemoryClickRepository`] - Per-link, per-day click counters

pub mod memory_click_repository;
pub mod memory_link_repository;

pub use memory_click_repository::MemoryClickRepository;
pub use memory_link_repository::MemoryLinkRepository;
