//! # URL Shortener Core
//!
//! Click accounting and short code allocation for a URL shortener.
//!
//! ## Architecture
//!
//! This crate follows Clean Architecture principles with clear layer separation:
//!
//! - **Domain Layer** ([`domain`]) - Event bus, click aggregator, code allocator
//!   and the repository traits they depend on
//! - **Application Layer** ([`application`]) - Link creation and redirect paths
//! - **Infrastructure Layer** ([`infrastructure`]) - In-memory repositories
//!
//! ## Features
//!
//! - In-process publish/subscribe bus with per-subscriber ordering
//! - Asynchronous click counting with a bounded buffer, retries and draining
//!   shutdown
//! - Short code allocation with a bounded number of collision retries
//!
//! ## Quick Start
//!
//! ```bash
//! # Shorten some URLs
//! cargo run -- shorten https://example.com https://rust-lang.org
//!
//! # Simulate redirect traffic and print the click totals
//! cargo run -- simulate --links 10 --visits 1000
//! ```
//!
//! ## Configuration
//!
//! Service configuration is loaded from environment variables via [`config::Config`].
//! See [`config`] module for available options.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod state;
pub mod utils;

pub mod bootstrap;
pub mod config;

pub use error::AppError;
pub use state::AppState;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::application::services::LinkService;
    pub use crate::domain::click_aggregator::{AggregatorConfig, AggregatorSnapshot, ClickAggregator};
    pub use crate::domain::code_allocator::{AllocatorConfig, CodeAllocator};
    pub use crate::domain::entities::{Link, NewLink};
    pub use crate::domain::event::{Event, EventKind, LinkId};
    pub use crate::domain::event_bus::{EventBus, SubscriptionHandle};
    pub use crate::domain::repositories::{ClickRepository, CodeExistence, LinkRepository};
    pub use crate::error::AppError;
    pub use crate::state::AppState;
}
