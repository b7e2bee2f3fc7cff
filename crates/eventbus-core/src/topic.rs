//! Topic name resolution
//!
//! Every subscription and every publication is routed by a canonical topic
//! string. The topic is computed from an implicit name (the handler's
//! declared default, or the event type name), optional explicit arguments
//! and optional per-event-type metadata registered at startup.
//!
//! ## Resolution rules
//!
//! 1. If metadata is registered for the event type and no explicit topic,
//!    prefix or suffix is supplied, the metadata's topic, prefix and suffix
//!    are adopted together.
//! 2. Otherwise each explicit argument is used as given, absent ones stay
//!    absent.
//!
//! The base is the explicit (or metadata) topic when non-blank, else the
//! implicit name. A non-blank prefix yields `prefix.base`, a non-blank suffix
//! appends `.suffix`. Blank strings count as absent everywhere.
//!
//! ```rust
//! use eventbus_core::{TopicArgs, TopicInfo, TopicResolver};
//!
//! let resolver = TopicResolver::new()
//!     .with_metadata("OrderCreated", TopicInfo::new("orders").prefix("v1"));
//!
//! assert_eq!(resolver.resolve("OrderCreated", None, &TopicArgs::none()), "v1.orders");
//! assert_eq!(
//!     resolver.resolve("OrderCreated", None, &TopicArgs::topic("audit")),
//!     "audit"
//! );
//! ```

use crate::types::IntegrationEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declarative topic metadata for an event type.
///
/// Registered once per event type in a [`TopicResolver`]; consulted only when
/// a caller supplies no explicit topic arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Topic name
    pub topic: Option<String>,
    /// Dot delimited prefix, which can include a version
    pub prefix: Option<String>,
    /// Dot delimited suffix, which can include a version
    pub suffix: Option<String>,
}

impl TopicInfo {
    /// Metadata with a topic name.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    /// Metadata without a topic name, leaving the type name as the base.
    pub fn unnamed() -> Self {
        Self::default()
    }

    /// Set the prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the suffix.
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }
}

/// Explicit topic arguments supplied at subscribe or publish time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicArgs {
    /// Explicit topic name
    pub topic: Option<String>,
    /// Explicit prefix
    pub prefix: Option<String>,
    /// Explicit suffix
    pub suffix: Option<String>,
}

impl TopicArgs {
    /// No explicit arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Only an explicit topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self::none().with_topic(topic)
    }

    /// Set the explicit topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the explicit prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the explicit suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// True if none of topic, prefix or suffix was supplied.
    pub fn is_empty(&self) -> bool {
        non_blank(self.topic.as_deref()).is_none()
            && non_blank(self.prefix.as_deref()).is_none()
            && non_blank(self.suffix.as_deref()).is_none()
    }
}

/// Resolves canonical topic names.
///
/// Holds the statically registered event-type metadata table. Resolution is
/// a pure function of its inputs and the table.
#[derive(Debug, Clone, Default)]
pub struct TopicResolver {
    metadata: HashMap<String, TopicInfo>,
}

impl TopicResolver {
    /// Create a resolver with no registered metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata for an event type name.
    pub fn with_metadata(mut self, event_type: impl Into<String>, info: TopicInfo) -> Self {
        self.register(event_type, info);
        self
    }

    /// Register metadata for a typed event.
    pub fn with_event<E: IntegrationEvent>(self, info: TopicInfo) -> Self {
        self.with_metadata(E::event_type(), info)
    }

    /// Register metadata for an event type name, replacing any previous entry.
    pub fn register(&mut self, event_type: impl Into<String>, info: TopicInfo) {
        self.metadata.insert(event_type.into(), info);
    }

    /// Registered metadata for an event type name.
    pub fn metadata(&self, event_type: &str) -> Option<&TopicInfo> {
        self.metadata.get(event_type)
    }

    /// Resolve the topic for an event type.
    ///
    /// # Arguments
    ///
    /// * `event_type` - Event type name, used for the metadata lookup and as
    ///   the implicit topic when `declared` is absent
    /// * `declared` - A handler's declared default topic
    /// * `args` - Explicit arguments
    pub fn resolve(&self, event_type: &str, declared: Option<&str>, args: &TopicArgs) -> String {
        let implicit = non_blank(declared).unwrap_or(event_type);
        resolve_topic(implicit, args, self.metadata(event_type))
    }
}

/// Resolve a canonical topic from an implicit name, explicit arguments and
/// optional metadata.
pub fn resolve_topic(implicit: &str, args: &TopicArgs, metadata: Option<&TopicInfo>) -> String {
    let (topic, prefix, suffix) = match metadata {
        Some(info) if args.is_empty() => (
            info.topic.as_deref(),
            info.prefix.as_deref(),
            info.suffix.as_deref(),
        ),
        _ => (
            args.topic.as_deref(),
            args.prefix.as_deref(),
            args.suffix.as_deref(),
        ),
    };
    format_topic(implicit, topic, prefix, suffix)
}

/// Join base, prefix and suffix with dots.
pub fn format_topic(
    implicit: &str,
    topic: Option<&str>,
    prefix: Option<&str>,
    suffix: Option<&str>,
) -> String {
    let base = non_blank(topic).unwrap_or(implicit);
    let mut name = match non_blank(prefix) {
        Some(prefix) => format!("{}.{}", prefix, base),
        None => base.to_string(),
    };
    if let Some(suffix) = non_blank(suffix) {
        name.push('.');
        name.push_str(suffix);
    }
    name
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
