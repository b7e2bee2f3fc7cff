//! # Event Bus Cache
//!
//! In-memory implementation of the [`eventbus_core::EventCache`] contract.
//!
//! The cache records, per event identifier, when the event was first seen
//! and the outcome of each handler that attempted it. Redelivered events are
//! reported as handled until the record times out, except for handlers whose
//! last attempt failed, which may retry immediately.
//!
//! ## Cleanup
//!
//! With cleanup enabled, two background sweeps remove expired records:
//! - error-free records every `event_cache_cleanup_interval` (default 5 min)
//! - records carrying handler errors every
//!   `event_errors_cache_cleanup_interval` (default 15 min), keeping failures
//!   around longer for inspection
//!
//! Sweeps are started with [`InMemoryEventCache::start`] and stopped with
//! [`InMemoryEventCache::shutdown`].
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use eventbus_cache::{EventCacheOptions, InMemoryEventCache};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = EventCacheOptions::from_env()?;
//! let cache = InMemoryEventCache::start_new(options);
//!
//! // ...
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod options;
pub mod sweeper;

// Re-export main types
pub use memory::InMemoryEventCache;
pub use options::{ConfigError, EventCacheOptions};
pub use sweeper::SweepKind;
