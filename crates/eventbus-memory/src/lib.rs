//! # Event Bus Memory
//!
//! In-process event bus for single-process applications and tests.
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use eventbus_cache::EventCacheOptions;
//! use eventbus_core::{Event, EventBus, EventHandler, HandlerError, TopicArgs};
//! use eventbus_memory::MemoryEventBus;
//! use std::sync::Arc;
//!
//! struct SendReceipt;
//!
//! #[async_trait]
//! impl EventHandler for SendReceipt {
//!     fn event_type(&self) -> &str {
//!         "OrderCreated"
//!     }
//!
//!     async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
//!         println!("receipt for {}", event.id);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = MemoryEventBus::new(EventCacheOptions::default());
//! bus.subscribe(Arc::new(SendReceipt), TopicArgs::none()).await?;
//!
//! let event = Event::new("OrderCreated", serde_json::json!({ "order_id": 7 }));
//! bus.publish(event.clone(), TopicArgs::none()).await?;
//!
//! // A redelivery of the same event is skipped.
//! bus.publish(event, TopicArgs::none()).await?;
//! assert_eq!(bus.stats().await.duplicates_skipped, 1);
//!
//! bus.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod bus;

// Re-export main types
pub use broker::InMemoryMessageBroker;
pub use bus::MemoryEventBus;
