//! In-memory event cache.
//!
//! All reads, writes and sweeps go through one `tokio::sync::Mutex` around the
//! record map, held for the full duration of each operation. The map is
//! never exposed outside this module.

use crate::options::EventCacheOptions;
use crate::sweeper::{SweepKind, Sweeper};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventbus_core::{Event, EventCache, HandlerOutcome, HandlingRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type Records = HashMap<String, HandlingRecord>;

/// State shared between the cache handle and its sweep tasks.
pub(crate) struct CacheState {
    options: EventCacheOptions,
    cleanup_enabled: AtomicBool,
    records: Mutex<Records>,
}

impl CacheState {
    fn new(options: EventCacheOptions) -> Self {
        Self {
            cleanup_enabled: AtomicBool::new(options.enable_event_cache_cleanup),
            options,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn options(&self) -> &EventCacheOptions {
        &self.options
    }

    pub(crate) fn app_name(&self) -> Option<&str> {
        self.options.app_name.as_deref()
    }

    pub(crate) fn cleanup_enabled(&self) -> bool {
        self.cleanup_enabled.load(Ordering::Acquire)
    }

    fn enabled(&self) -> bool {
        self.options.enable_event_cache
    }

    fn fresh_record(&self, event: &Event, handler: Option<&str>, outcome: HandlerOutcome) -> HandlingRecord {
        let record = HandlingRecord::new(event, self.options.event_cache_timeout);
        match handler {
            Some(name) => record.with_outcome(name, outcome),
            None => record,
        }
    }

    fn is_handled(records: &Records, event: &Event, handler: Option<&str>, now: DateTime<Utc>) -> bool {
        records
            .get(&event.id)
            .is_some_and(|r| !r.is_expired_at(now) && r.blocks(handler))
    }

    /// Set a handler outcome on a live record, or start a fresh record.
    fn upsert(&self, records: &mut Records, event: &Event, handler: Option<&str>, outcome: HandlerOutcome, now: DateTime<Utc>) {
        match records.get_mut(&event.id) {
            Some(record) if !record.is_expired_at(now) => {
                if let Some(name) = handler {
                    record.handlers.insert(name.to_string(), outcome);
                }
            }
            _ => {
                records.insert(event.id.clone(), self.fresh_record(event, handler, outcome));
            }
        }
    }

    pub(crate) async fn sweep(&self, kind: SweepKind) -> usize {
        let mut records = self.records.lock().await;
        let now = Utc::now();
        let before = records.len();
        records.retain(|_, record| {
            let matches_kind = match kind {
                SweepKind::Expired => !record.has_errors(),
                SweepKind::ExpiredWithErrors => record.has_errors(),
            };
            !(matches_kind && record.is_expired_at(now))
        });
        before - records.len()
    }
}

/// Thread-safe in-memory event cache.
///
/// Background sweeps are started explicitly with [`InMemoryEventCache::start`]
/// and stopped with [`InMemoryEventCache::shutdown`].
///
/// ```rust
/// use eventbus_cache::{EventCacheOptions, InMemoryEventCache};
/// use eventbus_core::{Event, EventCache};
///
/// # #[tokio::main]
/// # async fn main() {
/// let cache = InMemoryEventCache::new(EventCacheOptions::default());
/// let event = Event::new("OrderCreated", serde_json::json!({}));
///
/// assert!(!cache.has_been_handled_then_persist(&event, Some("Billing")).await);
/// assert!(cache.has_been_handled(&event, Some("Billing")).await);
/// # }
/// ```
pub struct InMemoryEventCache {
    state: Arc<CacheState>,
    sweeper: StdMutex<Option<Sweeper>>,
}

impl std::fmt::Debug for InMemoryEventCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventCache")
            .field("options", &self.state.options)
            .field("cleanup_enabled", &self.state.cleanup_enabled())
            .finish()
    }
}

impl Default for InMemoryEventCache {
    fn default() -> Self {
        Self::new(EventCacheOptions::default())
    }
}

impl InMemoryEventCache {
    /// Create a cache. No background task is started.
    pub fn new(options: EventCacheOptions) -> Self {
        Self {
            state: Arc::new(CacheState::new(options)),
            sweeper: StdMutex::new(None),
        }
    }

    /// Create a cache and start its sweeps. Must be called within a tokio
    /// runtime.
    pub fn start_new(options: EventCacheOptions) -> Self {
        let cache = Self::new(options);
        cache.start();
        cache
    }

    fn sweeper(&self) -> MutexGuard<'_, Option<Sweeper>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache options.
    pub fn options(&self) -> &EventCacheOptions {
        self.state.options()
    }

    /// Start the background sweeps if cleanup is enabled and they are not
    /// already running. Must be called within a tokio runtime.
    pub fn start(&self) {
        if !self.state.enabled() || !self.state.cleanup_enabled() {
            return;
        }
        if let Err(e) = self.state.options.validate() {
            warn!(error = %e, "Event cache cleanup not started");
            return;
        }

        let mut sweeper = self.sweeper();
        if sweeper.as_ref().is_some_and(Sweeper::is_running) {
            return;
        }
        *sweeper = Some(Sweeper::spawn(self.state.clone()));
        info!(app = self.state.app_name(), "Event cache cleanup started");
    }

    /// Stop both sweeps and wait for them to finish.
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }
    }

    /// True while a background sweep is running.
    pub fn is_running(&self) -> bool {
        self.sweeper().as_ref().is_some_and(Sweeper::is_running)
    }

    /// Turn background cleanup on or off.
    ///
    /// Running sweeps exit at their next tick after cleanup is turned off;
    /// call [`InMemoryEventCache::start`] to resume after turning it back on.
    pub fn set_cleanup_enabled(&self, enabled: bool) {
        self.state.cleanup_enabled.store(enabled, Ordering::Release);
    }

    /// True if background cleanup is enabled.
    pub fn is_cleanup_enabled(&self) -> bool {
        self.state.cleanup_enabled()
    }

    /// Run one sweep immediately, returning the number of removed records.
    pub async fn sweep(&self, kind: SweepKind) -> usize {
        self.state.sweep(kind).await
    }

    /// Copy of the record for an event identifier.
    pub async fn get(&self, event_id: &str) -> Option<HandlingRecord> {
        self.state.records.lock().await.get(event_id).cloned()
    }

    /// Remove the record for an event identifier.
    pub async fn remove(&self, event_id: &str) -> Option<HandlingRecord> {
        self.state.records.lock().await.remove(event_id)
    }

    /// Number of records, expired or not.
    pub async fn len(&self) -> usize {
        self.state.records.lock().await.len()
    }

    /// True if no record is stored.
    pub async fn is_empty(&self) -> bool {
        self.state.records.lock().await.is_empty()
    }
}

fn handler_name(handler: Option<&str>) -> Option<&str> {
    handler.filter(|h| !h.trim().is_empty())
}

#[async_trait]
impl EventCache for InMemoryEventCache {
    async fn has_been_handled(&self, event: &Event, handler: Option<&str>) -> bool {
        if !self.state.enabled() {
            return false;
        }
        let records = self.state.records.lock().await;
        CacheState::is_handled(&records, event, handler_name(handler), Utc::now())
    }

    async fn add_event(&self, event: &Event, handler: Option<&str>, error: Option<&str>) {
        if !self.state.enabled() {
            return;
        }
        let record = self
            .state
            .fresh_record(event, handler_name(handler), HandlerOutcome::completed(error));
        self.state
            .records
            .lock()
            .await
            .insert(event.id.clone(), record);
    }

    async fn update_event(&self, event: &Event, handler: Option<&str>, error: Option<&str>) {
        if !self.state.enabled() {
            return;
        }
        let mut records = self.state.records.lock().await;
        self.state.upsert(
            &mut records,
            event,
            handler_name(handler),
            HandlerOutcome::completed(error),
            Utc::now(),
        );
    }

    async fn has_been_handled_then_persist(&self, event: &Event, handler: Option<&str>) -> bool {
        if !self.state.enabled() {
            return false;
        }
        let handler = handler_name(handler);
        let mut records = self.state.records.lock().await;
        let now = Utc::now();

        if CacheState::is_handled(&records, event, handler, now) {
            return true;
        }
        self.state
            .upsert(&mut records, event, handler, HandlerOutcome::started(), now);
        debug!(event_id = %event.id, handler, "Recorded event handling attempt");
        false
    }
}
