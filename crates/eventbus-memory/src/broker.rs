//! In-process message broker
//!
//! Routes published events to the handlers subscribed on the same topic,
//! within the current process. Every delivery goes through an
//! [`IdempotentDispatcher`], so redelivering an event with the same id only
//! reaches handlers that have not yet processed it successfully.

use async_trait::async_trait;
use eventbus_core::{
    same_handler, DeliveryOutcome, Event, EventBusResult, HandlerRef, IdempotentDispatcher,
    MessageBroker,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory transport.
///
/// Handlers on a topic are invoked one after another in subscription order;
/// `publish` returns once all of them have run.
pub struct InMemoryMessageBroker {
    /// Topic subscribers
    topics: Arc<RwLock<HashMap<String, Vec<HandlerRef>>>>,
    /// Cache-gated delivery
    dispatcher: IdempotentDispatcher,
}

impl std::fmt::Debug for InMemoryMessageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMessageBroker")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl InMemoryMessageBroker {
    /// Create a broker delivering through `dispatcher`.
    pub fn new(dispatcher: IdempotentDispatcher) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            dispatcher,
        }
    }

    /// Deliver an event on a topic and report each handler's outcome.
    pub async fn deliver(&self, topic: &str, event: &Event) -> Vec<DeliveryOutcome> {
        let handlers = {
            let topics = self.topics.read().await;
            topics.get(topic).cloned().unwrap_or_default()
        };

        if handlers.is_empty() {
            debug!(topic = %topic, event_id = %event.id, "No handlers subscribed to topic");
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(handlers.len());
        for handler in &handlers {
            outcomes.push(self.dispatcher.deliver(event, handler.as_ref()).await);
        }
        outcomes
    }

    /// Number of handlers routed from a topic.
    pub async fn handler_count(&self, topic: &str) -> usize {
        self.topics.read().await.get(topic).map_or(0, Vec::len)
    }
}

#[async_trait]
impl MessageBroker for InMemoryMessageBroker {
    async fn subscribe(&self, topic: &str, handler: HandlerRef) -> EventBusResult<()> {
        let mut topics = self.topics.write().await;
        topics.entry(topic.to_string()).or_default().push(handler);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str, handler: &HandlerRef) -> EventBusResult<()> {
        let mut topics = self.topics.write().await;
        if let Some(handlers) = topics.get_mut(topic) {
            if let Some(index) = handlers.iter().position(|h| same_handler(h, handler)) {
                handlers.remove(index);
            }
            if handlers.is_empty() {
                topics.remove(topic);
            }
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, event: Event) -> EventBusResult<()> {
        let outcomes = self.deliver(topic, &event).await;
        debug!(
            topic = %topic,
            event_id = %event.id,
            deliveries = outcomes.len(),
            "Event delivered"
        );
        Ok(())
    }
}
