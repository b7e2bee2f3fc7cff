//! Cache-gated handler invocation
//!
//! Transports call [`IdempotentDispatcher::deliver`] once per subscribed
//! handler per received event. The dispatcher claims the event in the cache
//! before running the handler and records the outcome afterwards, so a
//! redelivered event is skipped by handlers that already processed it.

use crate::cache::EventCache;
use crate::handler::EventHandler;
use crate::types::Event;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Recorded when a handler fails without a message.
pub const HANDLER_FAILED: &str = "handler failed";

/// Recorded when a handler panics.
pub const HANDLER_PANICKED: &str = "handler panicked";

/// Result of delivering one event to one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The handler ran and succeeded
    Handled,
    /// The cache reported the event as already handled
    Skipped,
    /// The handler ran and failed
    Failed(String),
}

/// Delivery totals, shared by all clones of a dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
    /// Handler runs that succeeded
    pub handled: u64,
    /// Deliveries skipped as duplicates
    pub skipped: u64,
    /// Handler runs that failed
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    handled: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Wraps handler invocation with idempotency bookkeeping.
#[derive(Clone)]
pub struct IdempotentDispatcher {
    cache: Arc<dyn EventCache>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for IdempotentDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotentDispatcher").finish_non_exhaustive()
    }
}

impl IdempotentDispatcher {
    /// Create a dispatcher over a cache.
    pub fn new(cache: Arc<dyn EventCache>) -> Self {
        Self {
            cache,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Delivery totals so far.
    pub fn counts(&self) -> DeliveryCounts {
        DeliveryCounts {
            handled: self.counters.handled.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<dyn EventCache> {
        &self.cache
    }

    /// Deliver an event to a handler unless it was already handled.
    ///
    /// A panic inside the handler is caught and recorded as a failure, so the
    /// event stays eligible for retry and callers can go on delivering to
    /// other handlers.
    pub async fn deliver(&self, event: &Event, handler: &dyn EventHandler) -> DeliveryOutcome {
        let name = handler.name();

        if self.cache.has_been_handled_then_persist(event, Some(name)).await {
            debug!(event_id = %event.id, handler = name, "Skipping already handled event");
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return DeliveryOutcome::Skipped;
        }

        let result = AssertUnwindSafe(handler.handle(event)).catch_unwind().await;

        let message = match result {
            Ok(Ok(())) => {
                self.cache.update_event(event, Some(name), None).await;
                self.counters.handled.fetch_add(1, Ordering::Relaxed);
                return DeliveryOutcome::Handled;
            }
            Ok(Err(e)) if e.message.trim().is_empty() => HANDLER_FAILED.to_string(),
            Ok(Err(e)) => e.message,
            Err(_) => HANDLER_PANICKED.to_string(),
        };

        warn!(event_id = %event.id, handler = name, error = %message, "Event handler failed");
        self.cache
            .update_event(event, Some(name), Some(&message))
            .await;
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        DeliveryOutcome::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{HandlerOutcome, HandlingRecord};
    use crate::handler::HandlerError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Never-expiring cache keeping every record in a plain map.
    #[derive(Default)]
    struct FakeCache {
        records: Mutex<HashMap<String, HandlingRecord>>,
    }

    impl FakeCache {
        fn outcome(&self, event_id: &str, handler: &str) -> Option<HandlerOutcome> {
            let records = self.records.lock().unwrap();
            records.get(event_id)?.outcome(handler).cloned()
        }

        fn upsert(&self, event: &Event, handler: Option<&str>, outcome: HandlerOutcome) {
            let mut records = self.records.lock().unwrap();
            let record = records
                .entry(event.id.clone())
                .or_insert_with(|| HandlingRecord::new(event, Duration::from_secs(60)));
            if let Some(name) = handler {
                record.handlers.insert(name.to_string(), outcome);
            }
        }
    }

    #[async_trait]
    impl EventCache for FakeCache {
        async fn has_been_handled(&self, event: &Event, handler: Option<&str>) -> bool {
            let records = self.records.lock().unwrap();
            records.get(&event.id).is_some_and(|r| r.blocks(handler))
        }

        async fn add_event(&self, event: &Event, handler: Option<&str>, error: Option<&str>) {
            self.records.lock().unwrap().remove(&event.id);
            self.upsert(event, handler, HandlerOutcome::completed(error));
        }

        async fn update_event(&self, event: &Event, handler: Option<&str>, error: Option<&str>) {
            self.upsert(event, handler, HandlerOutcome::completed(error));
        }

        async fn has_been_handled_then_persist(&self, event: &Event, handler: Option<&str>) -> bool {
            if self.has_been_handled(event, handler).await {
                return true;
            }
            self.upsert(event, handler, HandlerOutcome::started());
            false
        }
    }

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn event_type(&self) -> &str {
            "Thing"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(HandlerError::new("boom"))
            } else {
                Ok(())
            }
        }
    }

    fn counting(fail: bool) -> Counting {
        Counting {
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    #[tokio::test]
    async fn test_redelivery_is_skipped_after_success() {
        let cache = Arc::new(FakeCache::default());
        let dispatcher = IdempotentDispatcher::new(cache.clone());
        let handler = counting(false);
        let event = Event::new("Thing", serde_json::json!({}));

        assert_eq!(dispatcher.deliver(&event, &handler).await, DeliveryOutcome::Handled);
        assert_eq!(dispatcher.deliver(&event, &handler).await, DeliveryOutcome::Skipped);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            dispatcher.counts(),
            DeliveryCounts {
                handled: 1,
                skipped: 1,
                failed: 0
            }
        );

        let outcome = cache.outcome(&event.id, "Counting").unwrap();
        assert_eq!(outcome.state, crate::cache::HandlerState::Completed);
        assert!(!outcome.has_error);
    }

    #[tokio::test]
    async fn test_failed_handler_is_retried() {
        let cache = Arc::new(FakeCache::default());
        let dispatcher = IdempotentDispatcher::new(cache.clone());
        let handler = counting(true);
        let event = Event::new("Thing", serde_json::json!({}));

        assert_eq!(
            dispatcher.deliver(&event, &handler).await,
            DeliveryOutcome::Failed("boom".to_string())
        );
        assert_eq!(
            dispatcher.deliver(&event, &handler).await,
            DeliveryOutcome::Failed("boom".to_string())
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.clone().counts().failed, 2);

        let outcome = cache.outcome(&event.id, "Counting").unwrap();
        assert_eq!(outcome.error_message.as_deref(), Some("boom"));
    }

    struct Silent;

    #[async_trait]
    impl EventHandler for Silent {
        fn event_type(&self) -> &str {
            "Thing"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            Err(HandlerError::new(""))
        }
    }

    struct Panicking {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Panicking {
        fn event_type(&self) -> &str {
            "Thing"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("handler exploded");
        }
    }

    #[tokio::test]
    async fn test_blank_error_message_still_records_failure() {
        let cache = Arc::new(FakeCache::default());
        let dispatcher = IdempotentDispatcher::new(cache.clone());
        let event = Event::new("Thing", serde_json::json!({}));

        assert_eq!(
            dispatcher.deliver(&event, &Silent).await,
            DeliveryOutcome::Failed(HANDLER_FAILED.to_string())
        );
        assert!(!cache.has_been_handled(&event, Some("Silent")).await);

        let outcome = cache.outcome(&event.id, "Silent").unwrap();
        assert!(outcome.has_error);
        assert_eq!(outcome.error_message.as_deref(), Some(HANDLER_FAILED));

        // Redelivery retries the handler instead of skipping it.
        assert_eq!(
            dispatcher.deliver(&event, &Silent).await,
            DeliveryOutcome::Failed(HANDLER_FAILED.to_string())
        );
        assert_eq!(dispatcher.counts().skipped, 0);
        assert_eq!(dispatcher.counts().failed, 2);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_recorded_and_retried() {
        let cache = Arc::new(FakeCache::default());
        let dispatcher = IdempotentDispatcher::new(cache.clone());
        let panicking = Panicking {
            calls: AtomicUsize::new(0),
        };
        let sibling = counting(false);
        let event = Event::new("Thing", serde_json::json!({}));

        assert_eq!(
            dispatcher.deliver(&event, &panicking).await,
            DeliveryOutcome::Failed(HANDLER_PANICKED.to_string())
        );
        assert_eq!(dispatcher.deliver(&event, &sibling).await, DeliveryOutcome::Handled);

        let outcome = cache.outcome(&event.id, "Panicking").unwrap();
        assert_eq!(outcome.state, crate::cache::HandlerState::Completed);
        assert_eq!(outcome.error_message.as_deref(), Some(HANDLER_PANICKED));

        assert_eq!(
            dispatcher.deliver(&event, &panicking).await,
            DeliveryOutcome::Failed(HANDLER_PANICKED.to_string())
        );
        assert_eq!(dispatcher.deliver(&event, &sibling).await, DeliveryOutcome::Skipped);
        assert_eq!(panicking.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sibling.calls.load(Ordering::SeqCst), 1);
    }
}
