//! Idempotent event cache contract
//!
//! An event cache lets a bus ask whether a handler already processed an
//! event, so that redelivery by an at-least-once transport does not repeat
//! side effects. Outcomes, including handler failures, are stored as data in
//! a [`HandlingRecord`] keyed by event identifier.
//!
//! Implementations may be in-memory or persistent; both must honor the
//! semantics documented on [`EventCache`].

use crate::types::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Progress of a handler on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerState {
    /// Not started
    NotStarted,
    /// Started
    Started,
    /// Completed, successfully or not
    Completed,
}

/// Outcome of one handler on one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    /// Handler progress
    pub state: HandlerState,
    /// True if the handler failed
    pub has_error: bool,
    /// Failure message, if any
    pub error_message: Option<String>,
}

impl HandlerOutcome {
    /// Outcome for an attempt that has begun.
    pub fn started() -> Self {
        Self {
            state: HandlerState::Started,
            has_error: false,
            error_message: None,
        }
    }

    /// Outcome for a finished attempt. A non-blank message marks an error.
    pub fn completed(error_message: Option<&str>) -> Self {
        let error_message = error_message
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string);
        Self {
            state: HandlerState::Completed,
            has_error: error_message.is_some(),
            error_message,
        }
    }
}

/// Cache entry for one event identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlingRecord {
    /// Event identifier
    pub event_id: String,
    /// The event
    pub event: Event,
    /// When the record was created
    pub recorded_at: DateTime<Utc>,
    /// How long after `recorded_at` the record stays valid
    pub timeout: Duration,
    /// Outcomes keyed by handler name; absence means not attempted
    pub handlers: HashMap<String, HandlerOutcome>,
}

impl HandlingRecord {
    /// Create a record stamped with the current time.
    pub fn new(event: &Event, timeout: Duration) -> Self {
        Self::recorded_at(event, timeout, Utc::now())
    }

    /// Create a record stamped with the given time.
    pub fn recorded_at(event: &Event, timeout: Duration, recorded_at: DateTime<Utc>) -> Self {
        Self {
            event_id: event.id.clone(),
            event: event.clone(),
            recorded_at,
            timeout,
            handlers: HashMap::new(),
        }
    }

    /// Attach a handler outcome.
    pub fn with_outcome(mut self, handler: impl Into<String>, outcome: HandlerOutcome) -> Self {
        self.handlers.insert(handler.into(), outcome);
        self
    }

    /// Instant after which the record is expired.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::MAX);
        self.recorded_at
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True if `now` is past the record's timeout.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// True if the record is expired now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Outcome recorded for a handler.
    pub fn outcome(&self, handler: &str) -> Option<&HandlerOutcome> {
        self.handlers.get(handler)
    }

    /// True if any handler recorded an error.
    pub fn has_errors(&self) -> bool {
        self.handlers.values().any(|o| o.has_error)
    }

    /// True if the record blocks another attempt by `handler`.
    ///
    /// A record without outcomes blocks every handler. Otherwise a handler is
    /// blocked only by its own error-free outcome.
    pub fn blocks(&self, handler: Option<&str>) -> bool {
        if self.handlers.is_empty() {
            return true;
        }
        match handler {
            Some(name) => self.outcome(name).is_some_and(|o| !o.has_error),
            None => !self.has_errors(),
        }
    }
}

/// Event cache to enable idempotency.
///
/// Handler names are optional; blank names are treated as absent.
#[async_trait]
pub trait EventCache: Send + Sync {
    /// True if a live record exists for the event and it blocks `handler`.
    ///
    /// Always false when the cache is disabled. Expired records and error
    /// outcomes report false so the event can be retried.
    async fn has_been_handled(&self, event: &Event, handler: Option<&str>) -> bool;

    /// Replace any record for the event with a fresh one, optionally carrying
    /// a completed outcome for `handler`. A non-blank `error` marks it failed.
    async fn add_event(&self, event: &Event, handler: Option<&str>, error: Option<&str>);

    /// Record a completed outcome for `handler` on an existing record,
    /// keeping its recorded time and timeout. Behaves like
    /// [`EventCache::add_event`] when no live record exists.
    async fn update_event(&self, event: &Event, handler: Option<&str>, error: Option<&str>);

    /// Check and claim in one step.
    ///
    /// Returns the [`EventCache::has_been_handled`] result. When it is false,
    /// records a started attempt for `handler` before returning, atomically
    /// with the check.
    async fn has_been_handled_then_persist(&self, event: &Event, handler: Option<&str>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event::new("Thing", serde_json::json!({}))
    }

    #[test]
    fn test_completed_outcome_error_detection() {
        assert!(!HandlerOutcome::completed(None).has_error);
        assert!(!HandlerOutcome::completed(Some("  ")).has_error);
        assert_eq!(HandlerOutcome::completed(Some("  ")).error_message, None);

        let failed = HandlerOutcome::completed(Some("boom"));
        assert!(failed.has_error);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert_eq!(failed.state, HandlerState::Completed);
    }

    #[test]
    fn test_expiry_is_derived_from_time() {
        let recorded = Utc::now();
        let record = HandlingRecord::recorded_at(&event(), Duration::from_secs(60), recorded);

        assert!(!record.is_expired_at(recorded));
        assert!(!record.is_expired_at(recorded + chrono::Duration::seconds(60)));
        assert!(record.is_expired_at(recorded + chrono::Duration::seconds(61)));
    }

    #[test]
    fn test_huge_timeout_never_overflows() {
        let record = HandlingRecord::new(&event(), Duration::MAX);
        assert!(!record.is_expired());
    }

    #[test]
    fn test_empty_record_blocks_everyone() {
        let record = HandlingRecord::new(&event(), Duration::from_secs(60));
        assert!(record.blocks(None));
        assert!(record.blocks(Some("AnyHandler")));
    }

    #[test]
    fn test_blocks_per_handler() {
        let record = HandlingRecord::new(&event(), Duration::from_secs(60))
            .with_outcome("Ok", HandlerOutcome::started())
            .with_outcome("Failed", HandlerOutcome::completed(Some("boom")));

        assert!(record.blocks(Some("Ok")));
        assert!(!record.blocks(Some("Failed")));
        assert!(!record.blocks(Some("NotAttempted")));
        assert!(!record.blocks(None));
        assert!(record.has_errors());
    }
}
