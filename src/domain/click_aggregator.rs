//! Background click accounting fed by `LinkVisited` events.
//!
//! # Flow
//!
//! 1. The redirect path publishes [`Event::LinkVisited`] on the [`EventBus`]
//! 2. The aggregator's subscription handler turns it into a pending click and
//!    puts it on a bounded queue, or drops it when the queue is full
//! 3. Worker tasks take pending clicks off the queue and call
//!    [`ClickRepository::increment_click_count`], retrying transient failures
//!    with exponential backoff
//!
//! Click accounting is best-effort. Under sustained overload, or when the
//! store keeps failing, clicks are dropped and counted instead of slowing down
//! redirects.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::event::{Event, EventKind, LinkId};
use crate::domain::event_bus::{EventBus, SubscriptionHandle};
use crate::domain::repositories::ClickRepository;
use crate::error::AppError;

/// Tuning knobs for [`ClickAggregator`].
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum number of clicks accepted but not yet finished (queued or being
    /// written). Events beyond this are dropped.
    pub queue_capacity: usize,
    /// Number of worker tasks writing to the store.
    pub workers: usize,
    /// Retries after the first failed write. Only transient errors are retried.
    pub retry_attempts: usize,
    /// Retry `n` waits up to `retry_base_delay · 2ⁿ` (jittered).
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// How long [`ClickAggregator::stop`] waits for the queue to drain.
    pub shutdown_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            workers: 4,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl AggregatorConfig {
    fn retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        let base_ms = u64::try_from(self.retry_base_delay.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);

        ExponentialBackoff::from_millis(2)
            .factor(base_ms)
            .max_delay(self.retry_max_delay)
            .map(jitter)
            .take(self.retry_attempts)
    }
}

/// Point-in-time copy of the aggregator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorSnapshot {
    /// `LinkVisited` events seen by the subscription handler.
    pub received: u64,
    /// Clicks written to the store.
    pub persisted: u64,
    /// Clicks dropped because the queue was full.
    pub dropped_overflow: u64,
    /// Clicks dropped after the store rejected them (retries exhausted or a
    /// permanent error).
    pub dropped_failed: u64,
    /// Clicks still pending when the shutdown timeout expired.
    pub abandoned: u64,
}

impl AggregatorSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_overflow + self.dropped_failed + self.abandoned
    }
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    persisted: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_failed: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> AggregatorSnapshot {
        AggregatorSnapshot {
            received: self.received.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_failed: self.dropped_failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }

    fn record_overflow(&self, link_id: LinkId) {
        let dropped = self.dropped_overflow.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!("clicks_dropped_total", "reason" => "queue_full").increment(1);

        if dropped == 1 || dropped.is_multiple_of(1000) {
            warn!(link_id, dropped, "Click queue full, dropping click events");
        } else {
            debug!(link_id, "Click queue full, click dropped");
        }
    }

    fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("clicks_dropped_total", "reason" => "shutdown").increment(count);
    }
}

/// One accepted click. Holds a queue slot until it is written or given up.
struct PendingClick {
    link_id: LinkId,
    _slot: OwnedSemaphorePermit,
}

type ClickQueue = Arc<AsyncMutex<mpsc::UnboundedReceiver<PendingClick>>>;

struct Running {
    subscription: SubscriptionHandle,
    workers: Vec<JoinHandle<()>>,
    queue: ClickQueue,
    cancel: CancellationToken,
}

/// Consumes `LinkVisited` events and increments click counters.
///
/// Create one per process, call [`Self::start`] during startup and
/// [`Self::stop`] during shutdown.
pub struct ClickAggregator<S: ClickRepository + ?Sized + 'static> {
    bus: EventBus,
    store: Arc<S>,
    config: AggregatorConfig,
    counters: Arc<Counters>,
    running: Mutex<Option<Running>>,
}

impl<S: ClickRepository + ?Sized + 'static> ClickAggregator<S> {
    pub fn new(bus: EventBus, store: Arc<S>, config: AggregatorConfig) -> Self {
        Self {
            bus,
            store,
            config,
            counters: Arc::new(Counters::default()),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn stats(&self) -> AggregatorSnapshot {
        self.counters.snapshot()
    }

    /// Subscribes to `LinkVisited` and spawns the worker tasks.
    ///
    /// Calling `start` on a running aggregator does nothing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("Click aggregator already running");
            return;
        }

        let slots = Arc::new(Semaphore::new(self.config.queue_capacity));
        let (tx, rx) = mpsc::unbounded_channel::<PendingClick>();
        let queue: ClickQueue = Arc::new(AsyncMutex::new(rx));
        let cancel = CancellationToken::new();

        let counters = self.counters.clone();
        let subscription = self.bus.subscribe(EventKind::LinkVisited, move |event| {
            let Event::LinkVisited { link_id } = event;
            counters.received.fetch_add(1, Ordering::Relaxed);

            let Ok(slot) = slots.clone().try_acquire_owned() else {
                counters.record_overflow(link_id);
                return;
            };

            if tx.send(PendingClick { link_id, _slot: slot }).is_err() {
                // Queue closed by a timed-out shutdown.
                counters.record_abandoned(1);
            }
        });

        let workers = (0..self.config.workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    queue.clone(),
                    self.store.clone(),
                    self.config.clone(),
                    self.counters.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        info!(
            queue_capacity = self.config.queue_capacity,
            workers = self.config.workers.max(1),
            "Click aggregator started"
        );

        *running = Some(Running {
            subscription,
            workers,
            queue,
            cancel,
        });
    }

    /// Unsubscribes and drains the queue.
    ///
    /// Clicks accepted before the call are still written, as long as that
    /// finishes within `shutdown_timeout`. After the timeout, whatever is left
    /// is abandoned and counted, including visits the bus delivers afterwards.
    /// The worker tasks and the subscription's dispatch task have all exited
    /// when this returns, so [`Self::stats`] is final.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(Running {
            subscription,
            mut workers,
            queue,
            cancel,
        }) = running
        else {
            debug!("Click aggregator not running");
            return;
        };

        // The queue closes once the bus has dispatched what was already
        // published and drops the handler.
        let dispatched = subscription.unsubscribe_and_wait();

        let drained = tokio::time::timeout(self.config.shutdown_timeout, join_workers(&mut workers))
            .await
            .is_ok();

        if !drained {
            warn!(
                timeout = ?self.config.shutdown_timeout,
                "Click queue not drained in time, abandoning pending clicks"
            );
            cancel.cancel();
            join_workers(&mut workers).await;

            let mut rx = queue.lock().await;
            // Later sends from the handler fail and count as abandoned.
            rx.close();
            let mut left = 0;
            while rx.try_recv().is_ok() {
                left += 1;
            }
            if left > 0 {
                self.counters.record_abandoned(left);
            }
        }

        dispatched.await;

        info!(stats = ?self.stats(), "Click aggregator stopped");
    }
}

/// Awaits workers one at a time, forgetting each as it finishes so an
/// interrupted call can be resumed.
async fn join_workers(workers: &mut Vec<JoinHandle<()>>) {
    while let Some(worker) = workers.last_mut() {
        let result = worker.await;
        workers.pop();
        if let Err(e) = result {
            error!(error = %e, "Click worker failed");
        }
    }
}

async fn run_worker<S: ClickRepository + ?Sized>(
    worker: usize,
    queue: ClickQueue,
    store: Arc<S>,
    config: AggregatorConfig,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    debug!(worker, "Click worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            click = async { queue.lock().await.recv().await } => click,
        };

        let Some(click) = next else {
            break;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                counters.record_abandoned(1);
                break;
            }
            _ = persist(store.as_ref(), &click, &config, &counters) => {}
        }
    }

    debug!(worker, "Click worker stopped");
}

async fn persist<S: ClickRepository + ?Sized>(
    store: &S,
    click: &PendingClick,
    config: &AggregatorConfig,
    counters: &Counters,
) {
    let link_id = click.link_id;

    let result = RetryIf::spawn(
        config.retry_strategy(),
        || store.increment_click_count(link_id),
        |e: &AppError| {
            if e.is_transient() {
                warn!(link_id, error = %e, "Transient click store failure");
            }
            e.is_transient()
        },
    )
    .await;

    match result {
        Ok(()) => {
            counters.persisted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("clicks_persisted_total").increment(1);
            debug!(link_id, "Click persisted");
        }
        Err(e) => {
            counters.dropped_failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("clicks_dropped_total", "reason" => "store_failure").increment(1);
            warn!(link_id, error = %e, "Dropping click after store failure");
        }
    }
}
