//! # Event Bus Core
//!
//! This crate provides the contracts of a decoupled publish/subscribe event
//! bus: publishers and handlers agree on topic names without knowing about
//! each other, and redelivered events are deduplicated per handler.
//!
//! ## Overview
//!
//! The eventbus-core crate handles:
//! - **Event Types**: The `Event` envelope and typed `IntegrationEvent`s
//! - **Topic Resolution**: Canonical topic names from explicit arguments,
//!   handler defaults and registered per-type metadata
//! - **Subscriptions**: Topic to handler lookup table
//! - **Idempotency**: The `EventCache` contract and cache-gated delivery
//!
//! Transports implement [`MessageBroker`]; caches implement [`EventCache`].
//! The `eventbus-cache` crate provides the in-memory cache and
//! `eventbus-memory` an in-process bus.
//!
//! ## Topic Names
//!
//! Topics are structured as `{prefix}.{topic}.{suffix}`:
//! - `OrderCreated` - Implicit topic from the event type name
//! - `v1.orders` - Explicit topic with a version prefix
//! - `orders.audit` - Explicit topic with a suffix
//!
//! ## Usage
//!
//! ```rust
//! use eventbus_core::{TopicArgs, TopicInfo, TopicResolver};
//!
//! let resolver = TopicResolver::new()
//!     .with_metadata("OrderCreated", TopicInfo::new("orders").prefix("v1"));
//!
//! let topic = resolver.resolve("OrderCreated", None, &TopicArgs::none());
//! assert_eq!(topic, "v1.orders");
//! ```

pub mod bus;
pub mod cache;
pub mod dispatch;
pub mod handler;
pub mod registry;
pub mod topic;
pub mod types;

// Re-export main types
pub use bus::{EventBus, EventBusError, EventBusExt, EventBusResult, EventBusStats, MessageBroker};
pub use cache::{EventCache, HandlerOutcome, HandlerState, HandlingRecord};
pub use dispatch::{
    DeliveryCounts, DeliveryOutcome, IdempotentDispatcher, HANDLER_FAILED, HANDLER_PANICKED,
};
pub use handler::{same_handler, EventHandler, HandlerError, HandlerRef};
pub use registry::SubscriptionRegistry;
pub use topic::{format_topic, resolve_topic, TopicArgs, TopicInfo, TopicResolver};
pub use types::{short_type_name, Event, IntegrationEvent};
