//! In-process publish/subscribe bus.
//!
//! # Guarantees
//!
//! - **Fan-out**: every handler subscribed to an event's kind at publish time
//!   receives the event once
//! - **Non-blocking publish**: [`EventBus::publish`] only enqueues; it never
//!   waits on a handler and never sees a handler failure
//! - **Per-publisher ordering**: events published one after another by the same
//!   caller reach each handler in that order
//! - **Isolation**: every subscription has its own dispatch task, and each
//!   handler call runs on Tokio's blocking pool, off the async workers. A slow
//!   handler delays only its own subscription, and a panicking handler loses
//!   only the event that triggered the panic
//!
//! Events are in-memory only; there is no replay and no history.
//!
//! # Handler obligations
//!
//! Handlers may block, but must not block indefinitely, and must not wait on
//! work they publish themselves. The dispatch queue of a subscription is
//! unbounded, so a handler that cannot keep up grows memory; hand slow work
//! off to a bounded queue the way
//! [`crate::domain::click_aggregator::ClickAggregator`] does.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::domain::event::{Event, EventKind};

/// Identifier of a registered subscription, unique per bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscriber {
    id: SubscriptionId,
    queue: mpsc::UnboundedSender<Event>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
}

impl Registry {
    fn remove(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();

        let Some(list) = subscribers.get_mut(&kind) else {
            return false;
        };

        let before = list.len();
        // Dropping the sender lets the dispatch task finish what is already queued.
        list.retain(|s| s.id != id);
        let removed = list.len() != before;

        if list.is_empty() {
            subscribers.remove(&kind);
        }

        removed
    }
}

/// Process-wide event bus.
///
/// Cloning is cheap and every clone shares the same subscriber registry, so a
/// single bus is created at startup and passed to the components that publish
/// or subscribe.
///
/// # Example
///
/// ```ignore
/// let bus = EventBus::new();
///
/// let _handle = bus.subscribe(EventKind::LinkVisited, |event| {
///     tracing::info!(?event, "visited");
/// });
///
/// // Returns immediately; the handler runs on its own task.
/// bus.publish(Event::link_visited(42));
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every event of `kind` published from now on.
    ///
    /// The handler is driven by a dedicated Tokio task that processes this
    /// subscription's events one at a time, in publish order. Each call runs
    /// on the blocking pool, so it may block without stalling publishers or
    /// other subscriptions.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (queue, rx) = mpsc::unbounded_channel();

        let dispatch = tokio::spawn(dispatch(id, kind, rx, Arc::new(handler)));

        self.registry
            .subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Subscriber { id, queue });

        debug!(subscription = %id, %kind, "Subscribed");

        SubscriptionHandle {
            id,
            kind,
            registry: Arc::downgrade(&self.registry),
            dispatch,
        }
    }

    /// Queues `event` for every handler currently subscribed to its kind.
    ///
    /// Never blocks and never fails from the caller's point of view. Returns
    /// the number of subscriptions the event was queued for.
    pub fn publish(&self, event: Event) -> usize {
        let kind = event.kind();
        let subscribers = self.registry.subscribers.read();

        let delivered = subscribers.get(&kind).map_or(0, |list| {
            list.iter()
                .filter(|s| s.queue.send(event.clone()).is_ok())
                .count()
        });

        metrics::counter!("events_published_total", "kind" => kind.as_str()).increment(1);

        delivered
    }

    /// Removes a subscription registered on this bus.
    ///
    /// Events already queued for the handler are still delivered. Returns
    /// `false` if the handle belongs to another bus or was already removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        if !Weak::ptr_eq(&Arc::downgrade(&self.registry), &handle.registry) {
            return false;
        }
        handle.unsubscribe()
    }

    /// Returns the number of active subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.registry
            .subscribers
            .read()
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "link_visited_subscribers",
                &self.subscriber_count(EventKind::LinkVisited),
            )
            .finish()
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`SubscriptionHandle::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    kind: EventKind,
    registry: Weak<Registry>,
    dispatch: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Stops future deliveries to this subscription.
    ///
    /// Returns `false` if the bus no longer exists or the subscription was
    /// already removed.
    pub fn unsubscribe(self) -> bool {
        self.remove()
    }

    /// Stops future deliveries right away and returns a future that resolves
    /// once every event already queued for this subscription was handled.
    ///
    /// The future resolves to the same value [`Self::unsubscribe`] returns.
    pub fn unsubscribe_and_wait(self) -> impl Future<Output = bool> + Send + 'static {
        let removed = self.remove();
        let (id, dispatch) = (self.id, self.dispatch);

        async move {
            if let Err(e) = dispatch.await {
                error!(subscription = %id, error = %e, "Dispatch task failed");
            }
            removed
        }
    }

    fn remove(&self) -> bool {
        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.kind, self.id));

        if removed {
            debug!(subscription = %self.id, kind = %self.kind, "Unsubscribed");
        }

        removed
    }
}

async fn dispatch<F>(
    id: SubscriptionId,
    kind: EventKind,
    mut rx: mpsc::UnboundedReceiver<Event>,
    handler: Arc<F>,
) where
    F: Fn(Event) + Send + Sync + 'static,
{
    while let Some(event) = rx.recv().await {
        let handler = handler.clone();

        match tokio::task::spawn_blocking(move || handler(event)).await {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                error!(subscription = %id, %kind, "Event handler panicked, event dropped");
                metrics::counter!("event_handler_panics_total", "kind" => kind.as_str())
                    .increment(1);
            }
            Err(e) => {
                error!(subscription = %id, %kind, error = %e, "Event handler did not run");
            }
        }
    }

    debug!(subscription = %id, %kind, "Dispatch task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::LinkId;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    async fn eventually(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn recorder(bus: &EventBus) -> (SubscriptionHandle, Arc<Mutex<Vec<LinkId>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = bus.subscribe(EventKind::LinkVisited, move |event| {
            let Event::LinkVisited { link_id } = event;
            sink.lock().push(link_id);
        });
        (handle, seen)
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(Event::link_visited(1)), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_handler_exactly_once() {
        let bus = EventBus::new();
        let recorders: Vec<_> = (0..5).map(|_| recorder(&bus)).collect();

        assert_eq!(bus.subscriber_count(EventKind::LinkVisited), 5);
        assert_eq!(bus.publish(Event::link_visited(42)), 5);

        for (_, seen) in &recorders {
            eventually(|| seen.lock().len() == 1).await;
        }

        tokio::time::sleep(Duration::from_millis(50)).await;

        for (_, seen) in &recorders {
            assert_eq!(*seen.lock(), vec![42]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_does_not_wait_for_slow_handler() {
        let bus = EventBus::new();
        let _handle = bus.subscribe(EventKind::LinkVisited, |_| {
            std::thread::sleep(Duration::from_millis(200));
        });

        let started = Instant::now();
        for id in 0..20 {
            bus.publish(Event::link_visited(id));
        }
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(50), "publish took {elapsed:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_handler_does_not_delay_others() {
        let bus = EventBus::new();
        let _slow = bus.subscribe(EventKind::LinkVisited, |_| {
            std::thread::sleep(Duration::from_millis(500));
        });
        let (_fast, seen) = recorder(&bus);

        let started = Instant::now();
        bus.publish(Event::link_visited(1));
        bus.publish(Event::link_visited(2));

        eventually(|| seen.lock().len() == 2).await;
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_blocking_handler_does_not_stall_current_thread_runtime() {
        let bus = EventBus::new();
        let _slow = bus.subscribe(EventKind::LinkVisited, |_| {
            std::thread::sleep(Duration::from_millis(500));
        });
        let (_fast, seen) = recorder(&bus);

        let started = Instant::now();
        bus.publish(Event::link_visited(1));

        tokio::time::sleep(Duration::from_millis(1)).await;
        let resumed = started.elapsed();
        assert!(resumed < Duration::from_millis(200), "publisher resumed after {resumed:?}");

        eventually(|| seen.lock().len() == 1).await;
        let delivered = started.elapsed();
        assert!(delivered < Duration::from_millis(200), "fast handler saw it after {delivered:?}");
    }

    #[tokio::test]
    async fn test_unsubscribe_and_wait_handles_backlog() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = bus.subscribe(EventKind::LinkVisited, move |event| {
            std::thread::sleep(Duration::from_millis(10));
            let Event::LinkVisited { link_id } = event;
            sink.lock().push(link_id);
        });

        for id in 1..=5 {
            bus.publish(Event::link_visited(id));
        }

        let done = handle.unsubscribe_and_wait();
        assert_eq!(bus.subscriber_count(EventKind::LinkVisited), 0);
        assert_eq!(bus.publish(Event::link_visited(6)), 0);

        assert!(done.await);
        assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_events_from_one_publisher_keep_order() {
        let bus = EventBus::new();
        let (_handle, seen) = recorder(&bus);

        for id in 1..=200 {
            bus.publish(Event::link_visited(id));
        }

        eventually(|| seen.lock().len() == 200).await;
        assert_eq!(*seen.lock(), (1..=200).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_future_deliveries() {
        let bus = EventBus::new();
        let (handle, seen) = recorder(&bus);

        bus.publish(Event::link_visited(1));
        eventually(|| seen.lock().len() == 1).await;

        assert!(bus.unsubscribe(handle));
        assert_eq!(bus.subscriber_count(EventKind::LinkVisited), 0);
        assert_eq!(bus.publish(Event::link_visited(2)), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unsubscribe_keeps_queued_events() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = bus.subscribe(EventKind::LinkVisited, move |event| {
            std::thread::sleep(Duration::from_millis(20));
            let Event::LinkVisited { link_id } = event;
            sink.lock().push(link_id);
        });

        for id in 1..=3 {
            bus.publish(Event::link_visited(id));
        }
        assert!(handle.unsubscribe());

        eventually(|| seen.lock().len() == 3).await;
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unsubscribe_with_foreign_handle_is_rejected() {
        let bus = EventBus::new();
        let other = EventBus::new();
        let (handle, _) = recorder(&other);

        assert!(!bus.unsubscribe(handle));
        assert_eq!(other.subscriber_count(EventKind::LinkVisited), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_after_bus_dropped() {
        let bus = EventBus::new();
        let (handle, _) = recorder(&bus);
        drop(bus);

        assert!(!handle.unsubscribe());
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let _faulty = bus.subscribe(EventKind::LinkVisited, |event| {
            if event == Event::link_visited(1) {
                panic!("handler failure");
            }
        });
        let (_healthy, seen) = recorder(&bus);

        let faulty_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = faulty_seen.clone();
        let _flaky = bus.subscribe(EventKind::LinkVisited, move |event| {
            let Event::LinkVisited { link_id } = event;
            if link_id == 1 {
                panic!("handler failure");
            }
            sink.lock().push(link_id);
        });

        assert_eq!(bus.publish(Event::link_visited(1)), 3);
        assert_eq!(bus.publish(Event::link_visited(2)), 3);

        eventually(|| seen.lock().len() == 2).await;
        eventually(|| faulty_seen.lock().len() == 1).await;
        assert_eq!(*faulty_seen.lock(), vec![2]);
    }

    #[tokio::test]
    async fn test_subscription_ids_are_distinct() {
        let bus = EventBus::new();
        let (a, _) = recorder(&bus);
        let (b, _) = recorder(&bus);

        assert_ne!(a.id(), b.id());
        assert_eq!(a.kind(), EventKind::LinkVisited);
    }
}
