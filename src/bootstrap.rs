//! Component wiring and startup.

use std::sync::Arc;

use anyhow::Result;

use crate::application::services::LinkService;
use crate::config::Config;
use crate::domain::click_aggregator::ClickAggregator;
use crate::domain::code_allocator::CodeAllocator;
use crate::domain::event_bus::EventBus;
use crate::infrastructure::persistence::{MemoryClickRepository, MemoryLinkRepository};
use crate::state::AppState;

/// Builds every component from `config` and starts click accounting.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the code alphabet in `config` is invalid.
pub fn start(config: &Config) -> Result<AppState> {
    let links = Arc::new(MemoryLinkRepository::new());
    let clicks = Arc::new(MemoryClickRepository::new());
    let bus = EventBus::new();

    let allocator = CodeAllocator::new(links.clone(), config.allocator_config()?);
    let link_service = Arc::new(LinkService::new(
        links.clone(),
        allocator,
        bus.clone(),
        config.link_create_max_attempts,
    ));

    let aggregator = Arc::new(ClickAggregator::new(
        bus.clone(),
        clicks.clone(),
        config.aggregator_config(),
    ));
    aggregator.start();

    Ok(AppState {
        bus,
        link_service,
        aggregator,
        links,
        clicks,
    })
}
