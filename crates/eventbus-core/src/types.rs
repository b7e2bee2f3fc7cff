//! Event types shared by publishers, handlers and caches
//!
//! This module defines the event envelope that travels through the bus and the
//! trait typed domain events implement to produce it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Event envelope.
///
/// All events are wrapped in this envelope before they are published. The
/// identifier is the event's identity for idempotency purposes; redelivering
/// the same envelope (same `id`) is how at-least-once transports surface
/// duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID
    pub id: String,

    /// Short type name of the producing event type (e.g., "OrderCreated")
    pub event_type: String,

    /// Timestamp when event was created
    pub created_at: DateTime<Utc>,

    /// Event payload
    pub payload: serde_json::Value,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Event {
    /// Create a new event.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The event type name, used as the implicit topic
    /// * `payload` - The event payload
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_type: event_type.into(),
            created_at: Utc::now(),
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Replace the generated identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Parse the payload into a specific type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// A typed domain event that can be published on the bus.
///
/// ```rust
/// use eventbus_core::IntegrationEvent;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct OrderCreated {
///     order_id: u64,
/// }
///
/// impl IntegrationEvent for OrderCreated {}
///
/// let event = OrderCreated { order_id: 7 }.to_event().unwrap();
/// assert_eq!(event.event_type, "OrderCreated");
/// ```
pub trait IntegrationEvent: Serialize + Send + Sync + 'static {
    /// Type name used as the implicit topic and as the topic metadata key.
    fn event_type() -> &'static str
    where
        Self: Sized,
    {
        short_type_name::<Self>()
    }

    /// Convert to the generic envelope with a fresh identifier.
    fn to_event(&self) -> Result<Event, serde_json::Error>
    where
        Self: Sized,
    {
        Ok(Event::new(Self::event_type(), serde_json::to_value(self)?))
    }
}

/// Last path segment of a type's name, without generic arguments.
///
/// `my_app::orders::OrderCreated` becomes `OrderCreated`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    strip_type_path(std::any::type_name::<T>())
}

pub(crate) fn strip_type_path(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
