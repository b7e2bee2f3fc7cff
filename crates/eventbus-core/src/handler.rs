//! Event handler contract

use crate::types::{strip_type_path, Event};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an event handler.
///
/// Handler failures are recorded in the event cache as data; they never
/// abort delivery to other handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    /// Error message recorded against the handler
    pub message: String,
}

impl HandlerError {
    /// Create a handler error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("Invalid payload: {}", err))
    }
}

/// Handler trait for processing events.
///
/// ```rust
/// use async_trait::async_trait;
/// use eventbus_core::{Event, EventHandler, HandlerError};
///
/// struct AuditLogger;
///
/// #[async_trait]
/// impl EventHandler for AuditLogger {
///     fn event_type(&self) -> &str {
///         "OrderCreated"
///     }
///
///     async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
///         println!("order {}", event.id);
///         Ok(())
///     }
/// }
///
/// assert_eq!(AuditLogger.name(), "AuditLogger");
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name of the event type this handler consumes.
    fn event_type(&self) -> &str;

    /// Declared default topic. Falls back to the event type name when absent.
    fn topic(&self) -> Option<&str> {
        None
    }

    /// Handler name used to key outcomes in the event cache.
    fn name(&self) -> &str {
        strip_type_path(std::any::type_name::<Self>())
    }

    /// Handle an event.
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Shared handler reference as stored by registries and brokers.
pub type HandlerRef = Arc<dyn EventHandler>;

/// Reference equality on handlers, ignoring vtable identity.
pub fn same_handler(a: &HandlerRef, b: &HandlerRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl EventHandler for Noop {
        fn event_type(&self) -> &str {
            "Thing"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct Named;

    #[async_trait]
    impl EventHandler for Named {
        fn event_type(&self) -> &str {
            "Thing"
        }

        fn topic(&self) -> Option<&str> {
            Some("things")
        }

        fn name(&self) -> &str {
            "named-handler"
        }

        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            Err(HandlerError::new("boom"))
        }
    }

    #[test]
    fn test_default_name_is_type_name() {
        let handler: HandlerRef = Arc::new(Noop);
        assert_eq!(handler.name(), "Noop");
        assert_eq!(handler.topic(), None);
        assert_eq!(Named.name(), "named-handler");
        assert_eq!(Named.topic(), Some("things"));
    }

    #[test]
    fn test_same_handler_is_reference_equality() {
        let a: HandlerRef = Arc::new(Noop);
        let b: HandlerRef = Arc::new(Noop);
        assert!(same_handler(&a, &a.clone()));
        assert!(!same_handler(&a, &b));
    }

    #[tokio::test]
    async fn test_handler_error_display() {
        let err = Named.handle(&Event::new("Thing", serde_json::json!({}))).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
