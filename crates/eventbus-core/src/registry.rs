//! Subscription registry
//!
//! Maps canonical topic names to the handlers subscribed to them, in
//! subscription order. The registry performs no deduplication: subscribing
//! the same handler twice means it is invoked twice.

use crate::handler::{same_handler, HandlerRef};
use crate::topic::{TopicArgs, TopicResolver};
use std::collections::HashMap;

/// Topic to handlers lookup table.
#[derive(Default, Clone)]
pub struct SubscriptionRegistry {
    resolver: TopicResolver,
    topics: HashMap<String, Vec<HandlerRef>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .topics
            .iter()
            .map(|(topic, handlers)| (topic.as_str(), handlers.len()))
            .collect();
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &counts)
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Create a registry resolving topics with the given resolver.
    pub fn new(resolver: TopicResolver) -> Self {
        Self {
            resolver,
            topics: HashMap::new(),
        }
    }

    /// The resolver used for subscribe and unsubscribe.
    pub fn resolver(&self) -> &TopicResolver {
        &self.resolver
    }

    /// Resolve the topic a handler subscribes to.
    pub fn topic_for(&self, handler: &HandlerRef, args: &TopicArgs) -> String {
        self.resolver
            .resolve(handler.event_type(), handler.topic(), args)
    }

    /// Append a handler to its resolved topic.
    ///
    /// Returns the resolved topic name.
    pub fn subscribe(&mut self, handler: HandlerRef, args: &TopicArgs) -> String {
        let topic = self.topic_for(&handler, args);
        self.topics.entry(topic.clone()).or_default().push(handler);
        topic
    }

    /// Remove the first occurrence of a handler from its resolved topic.
    ///
    /// Callers must pass the same arguments used to subscribe. A topic whose
    /// last handler is removed disappears from the registry. Returns the
    /// resolved topic if a handler was removed.
    pub fn unsubscribe(&mut self, handler: &HandlerRef, args: &TopicArgs) -> Option<String> {
        let topic = self.topic_for(handler, args);
        let handlers = self.topics.get_mut(&topic)?;
        let index = handlers.iter().position(|h| same_handler(h, handler))?;
        handlers.remove(index);
        if handlers.is_empty() {
            self.topics.remove(&topic);
        }
        Some(topic)
    }

    /// Handlers subscribed to a topic, in subscription order.
    pub fn handlers(&self, topic: &str) -> &[HandlerRef] {
        self.topics.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over topics and their handlers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[HandlerRef])> {
        self.topics
            .iter()
            .map(|(topic, handlers)| (topic.as_str(), handlers.as_slice()))
    }

    /// Subscribed topic names.
    pub fn topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    /// Snapshot of the full mapping.
    pub fn snapshot(&self) -> HashMap<String, Vec<HandlerRef>> {
        self.topics.clone()
    }

    /// Number of topics with at least one handler.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// True if no handler is subscribed.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Total number of handler registrations across topics.
    pub fn handler_count(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EventHandler, HandlerError};
    use crate::topic::TopicInfo;
    use crate::types::Event;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Handler1;
    struct Handler2;

    #[async_trait]
    impl EventHandler for Handler1 {
        fn event_type(&self) -> &str {
            "FakeEvent"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl EventHandler for Handler2 {
        fn event_type(&self) -> &str {
            "FakeEvent"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn arg_variants() -> Vec<TopicArgs> {
        vec![
            TopicArgs::none(),
            TopicArgs::none().with_prefix("v1"),
            TopicArgs::topic("my-topic"),
            TopicArgs::topic("my-topic").with_prefix("v1"),
        ]
    }

    #[test]
    fn test_unsubscribe_removes_handlers_then_topic() {
        for args in arg_variants() {
            let mut registry = SubscriptionRegistry::default();
            let h1: HandlerRef = Arc::new(Handler1);
            let h2: HandlerRef = Arc::new(Handler2);

            let topic = registry.subscribe(h1.clone(), &args);
            assert_eq!(registry.subscribe(h2.clone(), &args), topic);

            assert_eq!(registry.unsubscribe(&h1, &args), Some(topic.clone()));
            assert_eq!(registry.len(), 1);
            assert_eq!(registry.handlers(&topic).len(), 1);
            assert!(same_handler(&registry.handlers(&topic)[0], &h2));

            registry.unsubscribe(&h2, &args);
            assert!(registry.is_empty());
        }
    }

    #[test]
    fn test_duplicate_subscriptions_are_kept() {
        let mut registry = SubscriptionRegistry::default();
        let h1: HandlerRef = Arc::new(Handler1);

        registry.subscribe(h1.clone(), &TopicArgs::none());
        registry.subscribe(h1.clone(), &TopicArgs::none());
        assert_eq!(registry.handlers("FakeEvent").len(), 2);
        assert_eq!(registry.handler_count(), 2);

        registry.unsubscribe(&h1, &TopicArgs::none());
        assert_eq!(registry.handlers("FakeEvent").len(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let mut registry = SubscriptionRegistry::default();
        let h1: HandlerRef = Arc::new(Handler1);
        let h2: HandlerRef = Arc::new(Handler2);

        assert_eq!(registry.unsubscribe(&h1, &TopicArgs::none()), None);

        registry.subscribe(h1.clone(), &TopicArgs::none());
        assert_eq!(registry.unsubscribe(&h2, &TopicArgs::none()), None);
        assert_eq!(registry.unsubscribe(&h1, &TopicArgs::topic("other")), None);
        assert_eq!(registry.handlers("FakeEvent").len(), 1);
    }

    #[test]
    fn test_subscribe_uses_metadata() {
        let resolver = TopicResolver::new()
            .with_metadata("FakeEvent", TopicInfo::new("fakes").suffix("v2"));
        let mut registry = SubscriptionRegistry::new(resolver);
        let h1: HandlerRef = Arc::new(Handler1);

        assert_eq!(registry.subscribe(h1.clone(), &TopicArgs::none()), "fakes.v2");
        assert_eq!(registry.subscribe(h1, &TopicArgs::topic("x")), "x");

        let mut topics = registry.topics();
        topics.sort();
        assert_eq!(topics, vec!["fakes.v2".to_string(), "x".to_string()]);
    }
}
