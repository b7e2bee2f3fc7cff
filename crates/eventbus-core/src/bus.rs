//! Event bus abstraction
//!
//! This module defines the event bus contract, the transport contract it
//! publishes through and the shared error and statistics types.

use crate::handler::HandlerRef;
use crate::topic::TopicArgs;
use crate::types::{Event, IntegrationEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Event bus error types.
///
/// [`MessageBroker`] implementations report transport failures with
/// `PublishError` and `SubscribeError`; the bus passes them through unchanged.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Failed to publish event
    #[error("Failed to publish event: {0}")]
    PublishError(String),

    /// Failed to subscribe
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The bus has been shut down
    #[error("Event bus is shut down")]
    ShutDown,
}

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Event bus statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBusStats {
    /// Total events published
    pub events_published: u64,
    /// Handler invocations that completed successfully
    pub events_handled: u64,
    /// Deliveries skipped because the cache reported them handled
    pub duplicates_skipped: u64,
    /// Handler invocations that failed
    pub handler_failures: u64,
    /// Topics with at least one subscribed handler
    pub subscribed_topics: usize,
    /// Registered handlers across all topics
    pub registered_handlers: usize,
}

/// Transport that physically moves events to subscribed handlers.
///
/// The bus resolves topic names and hands them to the broker; the broker
/// routes published events to every handler subscribed to the topic.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Route events published on `topic` to `handler`.
    ///
    /// Fails with [`EventBusError::SubscribeError`] when the transport cannot
    /// register the route; the bus then rolls back its registry.
    async fn subscribe(&self, topic: &str, handler: HandlerRef) -> EventBusResult<()>;

    /// Stop routing `topic` to `handler`.
    ///
    /// On error the bus keeps the handler registered.
    async fn unsubscribe(&self, topic: &str, handler: &HandlerRef) -> EventBusResult<()>;

    /// Publish an event on a resolved topic.
    ///
    /// Fails with [`EventBusError::PublishError`] when the transport cannot
    /// accept the event. Handler failures are not transport failures.
    async fn publish(&self, topic: &str, event: Event) -> EventBusResult<()>;
}

/// Event bus trait for publish/subscribe operations.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Register a handler.
    ///
    /// Returns the resolved topic name.
    async fn subscribe(&self, handler: HandlerRef, args: TopicArgs) -> EventBusResult<String>;

    /// Unregister a handler. Arguments must match the original subscription.
    async fn unsubscribe(&self, handler: &HandlerRef, args: TopicArgs) -> EventBusResult<()>;

    /// Publish an event.
    async fn publish(&self, event: Event, args: TopicArgs) -> EventBusResult<()>;

    /// Topics with their subscribed handlers.
    async fn topics(&self) -> HashMap<String, Vec<HandlerRef>>;

    /// Get event bus stats.
    async fn stats(&self) -> EventBusStats;
}

/// Typed publishing on top of [`EventBus`].
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Convert a typed event to an envelope and publish it.
    async fn publish_typed<E: IntegrationEvent>(&self, event: &E, args: TopicArgs) -> EventBusResult<()> {
        let event = event.to_event()?;
        self.publish(event, args).await
    }
}

impl<T: EventBus + ?Sized> EventBusExt for T {}
