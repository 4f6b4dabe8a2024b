//! Link creation and redirect resolution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::code_allocator::CodeAllocator;
use crate::domain::entities::{Link, NewLink};
use crate::domain::event::Event;
use crate::domain::event_bus::EventBus;
use crate::domain::repositories::{CodeExistence, LinkRepository};
use crate::error::AppError;

/// Default number of inserts tried before a creation fails.
pub const DEFAULT_CREATE_ATTEMPTS: u32 = 5;

/// Service behind the creation and redirect paths.
///
/// Creation allocates a code and inserts the link, allocating again whenever
/// the store's uniqueness constraint rejects the insert. Resolution looks the
/// code up and publishes a `LinkVisited` event without waiting for click
/// accounting.
pub struct LinkService<L: LinkRepository + ?Sized, C: CodeExistence + ?Sized> {
    link_repository: Arc<L>,
    allocator: CodeAllocator<C>,
    bus: EventBus,
    max_create_attempts: u32,
}

impl<L: LinkRepository + ?Sized, C: CodeExistence + ?Sized> LinkService<L, C> {
    /// Creates a new link service.
    pub fn new(
        link_repository: Arc<L>,
        allocator: CodeAllocator<C>,
        bus: EventBus,
        max_create_attempts: u32,
    ) -> Self {
        Self {
            link_repository,
            allocator,
            bus,
            max_create_attempts,
        }
    }

    /// Creates a short link for `url` with a freshly allocated code.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::CodeSpaceExhausted`] if the allocator runs out of
    /// attempts, or if every one of `max_create_attempts` inserts hit a
    /// uniqueness conflict.
    ///
    /// Other store errors are returned as-is.
    pub async fn create_short_link(&self, url: String) -> Result<Link, AppError> {
        self.create_short_link_cancellable(url, &CancellationToken::new())
            .await
    }

    /// Like [`Self::create_short_link`], but stops allocating once `cancel`
    /// fires.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Cancelled`] if `cancel` fires during allocation.
    pub async fn create_short_link_cancellable(
        &self,
        url: String,
        cancel: &CancellationToken,
    ) -> Result<Link, AppError> {
        for attempt in 1..=self.max_create_attempts {
            let code = self.allocator.allocate_cancellable(cancel).await?;

            let new_link = NewLink {
                url: url.clone(),
                code,
            };

            match self.link_repository.create(new_link).await {
                Ok(link) => {
                    info!(link_id = link.id, code = %link.code, "Short link created");
                    return Ok(link);
                }
                Err(e) if e.is_unique_violation() => {
                    warn!(attempt, error = %e, "Short code claimed concurrently, allocating again");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            attempts = self.max_create_attempts,
            "Giving up on link creation after repeated code conflicts"
        );
        metrics::counter!("code_allocation_exhausted_total").increment(1);

        Err(AppError::code_space_exhausted(self.max_create_attempts))
    }

    /// Resolves `code` for a redirect and records the visit.
    ///
    /// The visit is published on the event bus and accounted for in the
    /// background; this call never waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no non-deleted link uses `code`.
    pub async fn resolve_for_redirect(&self, code: &str) -> Result<Link, AppError> {
        let link = self
            .link_repository
            .find_by_code(code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Short link '{code}' not found")))?;

        let subscribers = self.bus.publish(Event::link_visited(link.id));
        debug!(link_id = link.id, subscribers, "Visit published");

        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::code_allocator::AllocatorConfig;
    use crate::domain::event::EventKind;
    use crate::domain::repositories::{MockCodeExistence, MockLinkRepository};
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn create_test_link(id: i64, code: &str, url: &str) -> Link {
        Link::new(id, url.to_string(), code.to_string(), Utc::now())
    }

    fn service(
        links: MockLinkRepository,
        lookup: MockCodeExistence,
        bus: EventBus,
        max_create_attempts: u32,
    ) -> LinkService<MockLinkRepository, MockCodeExistence> {
        let allocator = CodeAllocator::new(Arc::new(lookup), AllocatorConfig::default());
        LinkService::new(Arc::new(links), allocator, bus, max_create_attempts)
    }

    fn free_codes(times: usize) -> MockCodeExistence {
        let mut lookup = MockCodeExistence::new();
        lookup
            .expect_link_exists_by_code()
            .times(times)
            .returning(|_| Ok(false));
        lookup
    }

    #[tokio::test]
    async fn test_create_short_link_success() {
        let mut links = MockLinkRepository::new();
        links
            .expect_create()
            .withf(|new_link| new_link.url == "https://example.com" && new_link.code.len() == 8)
            .times(1)
            .returning(|new_link| Ok(create_test_link(10, &new_link.code, &new_link.url)));

        let service = service(links, free_codes(1), EventBus::new(), 5);

        let link = service
            .create_short_link("https://example.com".to_string())
            .await
            .unwrap();

        assert_eq!(link.id, 10);
        assert_eq!(link.url, "https://example.com");
    }

    #[tokio::test]
    async fn test_create_short_link_retries_after_insert_conflict() {
        let attempted = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = attempted.clone();

        let mut links = MockLinkRepository::new();
        links.expect_create().times(2).returning(move |new_link| {
            let mut log = log.lock();
            log.push(new_link.code.clone());
            if log.len() == 1 {
                Err(AppError::conflict(
                    "Unique constraint violation",
                    Some("links_code_key"),
                ))
            } else {
                Ok(create_test_link(11, &new_link.code, &new_link.url))
            }
        });

        let service = service(links, free_codes(2), EventBus::new(), 5);

        let link = service
            .create_short_link("https://example.com".to_string())
            .await
            .unwrap();

        let attempted = attempted.lock();
        assert_eq!(attempted.len(), 2);
        assert_eq!(link.code, attempted[1]);
    }

    #[tokio::test]
    async fn test_create_short_link_exhausts_on_repeated_conflicts() {
        let mut links = MockLinkRepository::new();
        links
            .expect_create()
            .times(3)
            .returning(|_| Err(AppError::conflict("Unique constraint violation", None)));

        let service = service(links, free_codes(3), EventBus::new(), 3);

        let result = service
            .create_short_link("https://example.com".to_string())
            .await;

        assert!(matches!(
            result,
            Err(AppError::CodeSpaceExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn test_create_short_link_surfaces_allocator_exhaustion() {
        let mut lookup = MockCodeExistence::new();
        lookup
            .expect_link_exists_by_code()
            .times(5)
            .returning(|_| Ok(true));

        let mut links = MockLinkRepository::new();
        links.expect_create().times(0);

        let service = service(links, lookup, EventBus::new(), 5);

        let result = service
            .create_short_link("https://example.com".to_string())
            .await;

        assert!(matches!(
            result,
            Err(AppError::CodeSpaceExhausted { attempts: 5 })
        ));
    }

    #[tokio::test]
    async fn test_create_short_link_propagates_store_error() {
        let mut links = MockLinkRepository::new();
        links
            .expect_create()
            .times(1)
            .returning(|_| Err(AppError::unavailable("pool timed out")));

        let service = service(links, free_codes(1), EventBus::new(), 5);

        let result = service
            .create_short_link("https://example.com".to_string())
            .await;

        assert!(matches!(result, Err(AppError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_create_short_link_cancelled() {
        let mut links = MockLinkRepository::new();
        links.expect_create().times(0);

        let service = service(links, MockCodeExistence::new(), EventBus::new(), 5);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = service
            .create_short_link_cancellable("https://example.com".to_string(), &cancel)
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
    }

    #[tokio::test]
    async fn test_resolve_for_redirect_publishes_visit() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _handle = bus.subscribe(EventKind::LinkVisited, move |event| sink.lock().push(event));

        let mut links = MockLinkRepository::new();
        links
            .expect_find_by_code()
            .withf(|code| code == "abc12345")
            .times(1)
            .returning(|code| Ok(Some(create_test_link(7, code, "https://example.com"))));

        let service = service(links, MockCodeExistence::new(), bus, 5);

        let link = service.resolve_for_redirect("abc12345").await.unwrap();
        assert_eq!(link.id, 7);

        let deadline = Instant::now() + Duration::from_secs(5);
        while seen.lock().is_empty() {
            assert!(Instant::now() < deadline, "visit was not published");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*seen.lock(), vec![Event::link_visited(7)]);
    }

    #[tokio::test]
    async fn test_resolve_for_redirect_not_found() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _handle = bus.subscribe(EventKind::LinkVisited, move |event| sink.lock().push(event));

        let mut links = MockLinkRepository::new();
        links
            .expect_find_by_code()
            .times(1)
            .returning(|_| Ok(None));

        let service = service(links, MockCodeExistence::new(), bus, 5);

        let result = service.resolve_for_redirect("missing1").await;
        assert!(matches!(result, Err(AppError::NotFound { .. })));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().is_empty());
    }
}
