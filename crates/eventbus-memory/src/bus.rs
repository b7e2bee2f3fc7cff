//! In-process event bus
//!
//! [`MemoryEventBus`] resolves topic names, keeps the subscription registry
//! and publishes through a [`MessageBroker`] whose deliveries are gated by
//! the in-memory event cache.

use crate::broker::InMemoryMessageBroker;
use async_trait::async_trait;
use eventbus_cache::{EventCacheOptions, InMemoryEventCache};
use eventbus_core::{
    same_handler, Event, EventBus, EventBusError, EventBusResult, EventBusStats, HandlerRef,
    IdempotentDispatcher, MessageBroker, SubscriptionRegistry, TopicArgs, TopicResolver,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory event bus implementation.
///
/// This is suitable for single-process applications and testing. Other
/// transports plug in through [`MemoryEventBus::with_broker`].
pub struct MemoryEventBus {
    /// Topic to handlers mapping
    registry: RwLock<SubscriptionRegistry>,
    /// Transport
    broker: Arc<dyn MessageBroker>,
    /// Cache-gated delivery shared with the broker
    dispatcher: IdempotentDispatcher,
    /// Idempotency cache
    cache: Arc<InMemoryEventCache>,
    /// Total events published
    events_published: AtomicU64,
    /// Set by shutdown
    shut_down: AtomicBool,
}

impl std::fmt::Debug for MemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEventBus")
            .field("cache", &self.cache)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryEventBus {
    /// Create a new in-memory event bus with default topic resolution.
    ///
    /// Starts the cache sweeps when cleanup is enabled, which requires a
    /// tokio runtime.
    pub fn new(options: EventCacheOptions) -> Self {
        Self::with_resolver(TopicResolver::new(), options)
    }

    /// Create with registered topic metadata.
    pub fn with_resolver(resolver: TopicResolver, options: EventCacheOptions) -> Self {
        Self::with_broker(resolver, options, |dispatcher| {
            Arc::new(InMemoryMessageBroker::new(dispatcher))
        })
    }

    /// Create with a custom transport.
    ///
    /// `make_broker` receives the cache-gated dispatcher the transport must
    /// invoke once per subscribed handler per received event.
    pub fn with_broker<F>(resolver: TopicResolver, options: EventCacheOptions, make_broker: F) -> Self
    where
        F: FnOnce(IdempotentDispatcher) -> Arc<dyn MessageBroker>,
    {
        let cache = Arc::new(InMemoryEventCache::start_new(options));
        let dispatcher = IdempotentDispatcher::new(cache.clone());
        let broker = make_broker(dispatcher.clone());

        Self {
            registry: RwLock::new(SubscriptionRegistry::new(resolver)),
            broker,
            dispatcher,
            cache,
            events_published: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// The idempotency cache.
    pub fn cache(&self) -> &Arc<InMemoryEventCache> {
        &self.cache
    }

    /// Resolve the topic an event would be published on.
    pub async fn topic_for(&self, event: &Event, args: &TopicArgs) -> String {
        self.registry
            .read()
            .await
            .resolver()
            .resolve(&event.event_type, None, args)
    }

    /// Stop accepting publications and stop the cache sweeps.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cache.shutdown().await;
        info!("Event bus shut down");
    }

    fn ensure_running(&self) -> EventBusResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(EventBusError::ShutDown);
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn subscribe(&self, handler: HandlerRef, args: TopicArgs) -> EventBusResult<String> {
        self.ensure_running()?;

        let topic = self
            .registry
            .write()
            .await
            .subscribe(handler.clone(), &args);

        if let Err(e) = self.broker.subscribe(&topic, handler.clone()).await {
            self.registry.write().await.unsubscribe(&handler, &args);
            return Err(e);
        }

        debug!(topic = %topic, handler = handler.name(), "Handler subscribed");
        Ok(topic)
    }

    async fn unsubscribe(&self, handler: &HandlerRef, args: TopicArgs) -> EventBusResult<()> {
        let mut registry = self.registry.write().await;
        let topic = registry.topic_for(handler, &args);

        if !registry.handlers(&topic).iter().any(|h| same_handler(h, handler)) {
            debug!(topic = %topic, handler = handler.name(), "Handler was not subscribed");
            return Ok(());
        }

        // Keep the registry entry if the transport refuses.
        self.broker.unsubscribe(&topic, handler).await?;
        registry.unsubscribe(handler, &args);

        debug!(topic = %topic, handler = handler.name(), "Handler unsubscribed");
        Ok(())
    }

    async fn publish(&self, event: Event, args: TopicArgs) -> EventBusResult<()> {
        self.ensure_running()?;

        let topic = self.topic_for(&event, &args).await;
        let event_id = event.id.clone();

        self.broker.publish(&topic, event).await?;
        self.events_published.fetch_add(1, Ordering::Relaxed);

        debug!(topic = %topic, event_id = %event_id, "Event published");
        Ok(())
    }

    async fn topics(&self) -> HashMap<String, Vec<HandlerRef>> {
        self.registry.read().await.snapshot()
    }

    async fn stats(&self) -> EventBusStats {
        let counts = self.dispatcher.counts();
        let registry = self.registry.read().await;

        EventBusStats {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_handled: counts.handled,
            duplicates_skipped: counts.skipped,
            handler_failures: counts.failed,
            subscribed_topics: registry.len(),
            registered_handlers: registry.handler_count(),
        }
    }
}
