//! Domain layer: events, the event bus, click accounting and code allocation.
//!
//! # Architecture
//!
//! - [`event`] - Event model (`Event`, `EventKind`)
//! - [`event_bus`] - In-process publish/subscribe bus
//! - [`click_aggregator`] - Bounded, retrying consumer of visit events
//! - [`code_allocator`] - Collision-avoiding short code allocation
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Storage capability traits
//!
//! # Click Processing Flow
//!
//! 1. The redirect path resolves a code
//! 2. [`event::Event::LinkVisited`] is published on the [`event_bus::EventBus`]
//! 3. [`click_aggregator::ClickAggregator`] queues it, or drops it when full
//! 4. A worker persists it via [`repositories::ClickRepository`] with retry

pub mod click_aggregator;
pub mod code_allocator;
pub mod entities;
pub mod event;
pub mod event_bus;
pub mod repositories;
