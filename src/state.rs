//! Shared application state.

use std::sync::Arc;

use crate::application::services::LinkService;
use crate::domain::click_aggregator::ClickAggregator;
use crate::domain::event_bus::EventBus;
use crate::infrastructure::persistence::{MemoryClickRepository, MemoryLinkRepository};

/// Link service over the in-memory store, which also answers code lookups.
pub type MemoryLinkService = LinkService<MemoryLinkRepository, MemoryLinkRepository>;

/// Wired components shared by every caller.
///
/// Cloning is cheap; all fields are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub link_service: Arc<MemoryLinkService>,
    pub aggregator: Arc<ClickAggregator<MemoryClickRepository>>,
    pub links: Arc<MemoryLinkRepository>,
    pub clicks: Arc<MemoryClickRepository>,
}

impl AppState {
    /// Stops click accounting, draining clicks still pending.
    pub async fn shutdown(&self) {
        self.aggregator.stop().await;
    }
}
