#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use url_shortener_core::application::services::LinkService;
use url_shortener_core::domain::click_aggregator::{AggregatorConfig, ClickAggregator};
use url_shortener_core::domain::code_allocator::{AllocatorConfig, CodeAllocator};
use url_shortener_core::domain::event::LinkId;
use url_shortener_core::domain::event_bus::EventBus;
use url_shortener_core::domain::repositories::{ClickRepository, CodeExistence};
use url_shortener_core::error::AppError;
use url_shortener_core::infrastructure::persistence::{MemoryClickRepository, MemoryLinkRepository};

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Aggregator settings with short delays for tests.
pub fn aggregator_config(queue_capacity: usize, workers: usize) -> AggregatorConfig {
    AggregatorConfig {
        queue_capacity,
        workers,
        retry_attempts: 2,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        shutdown_timeout: Duration::from_secs(5),
    }
}

/// Click store whose writes wait until the gate is opened.
pub struct GatedClickStore {
    gate: Semaphore,
    calls: AtomicUsize,
    counts: Mutex<HashMap<LinkId, u64>>,
}

impl GatedClickStore {
    pub fn closed() -> Self {
        Self {
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Lets every pending and future write through.
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Writes started, finished or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn persisted(&self) -> u64 {
        self.counts.lock().values().sum()
    }
}

#[async_trait]
impl ClickRepository for GatedClickStore {
    async fn increment_click_count(&self, link_id: LinkId) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _pass = self
            .gate
            .acquire()
            .await
            .map_err(|_| AppError::internal("gate closed"))?;
        *self.counts.lock().entry(link_id).or_default() += 1;
        Ok(())
    }
}

/// Existence check that claims every code it reports as free, so that later
/// checks for the same code see it taken.
#[derive(Default)]
pub struct ReservingLookup {
    taken: Mutex<HashSet<String>>,
    checks: AtomicUsize,
}

impl ReservingLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeExistence for ReservingLookup {
    async fn link_exists_by_code(&self, code: &str) -> Result<bool, AppError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(!self.taken.lock().insert(code.to_string()))
    }
}

/// Components wired over the in-memory stores.
pub struct TestApp {
    pub bus: EventBus,
    pub links: Arc<MemoryLinkRepository>,
    pub clicks: Arc<MemoryClickRepository>,
    pub service: LinkService<MemoryLinkRepository, MemoryLinkRepository>,
    pub aggregator: ClickAggregator<MemoryClickRepository>,
}

pub fn create_test_app(allocator: AllocatorConfig, aggregator: AggregatorConfig) -> TestApp {
    let bus = EventBus::new();
    let links = Arc::new(MemoryLinkRepository::new());
    let clicks = Arc::new(MemoryClickRepository::new());

    let service = LinkService::new(
        links.clone(),
        CodeAllocator::new(links.clone(), allocator),
        bus.clone(),
        5,
    );
    let aggregator = ClickAggregator::new(bus.clone(), clicks.clone(), aggregator);

    TestApp {
        bus,
        links,
        clicks,
        service,
        aggregator,
    }
}
