//! Handler trait for bus subscribers.
//!
//! Handlers are:
//! - **Async**: awaited by the bus dispatcher
//! - **Isolated**: an error, panic or timeout in one handler never stops
//!   delivery to the next one

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use super::types::Event;

/// Error type for handler operations.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Handler execution failed with a message.
    #[error("Handler execution failed: {0}")]
    Execution(String),

    /// The payload was not the one this handler expects.
    #[error("Unexpected payload for {0}")]
    UnexpectedPayload(String),

    /// Downstream storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Downstream cache failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        HandlerError::Execution(msg.into())
    }

    /// Create an unexpected payload error naming the handler.
    pub fn unexpected_payload(handler: impl Into<String>) -> Self {
        HandlerError::UnexpectedPayload(handler.into())
    }

    /// Create a storage error from a string.
    pub fn storage(msg: impl Into<String>) -> Self {
        HandlerError::Storage(msg.into())
    }

    /// Create a cache error from a string.
    pub fn cache(msg: impl Into<String>) -> Self {
        HandlerError::Cache(msg.into())
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// Subscriber to one or more event types.
///
/// # Implementation Notes
///
/// - Handlers for the same event type run one after another, in subscription
///   order, so keep them short; spawn heavy work
/// - Errors are logged by the bus and never reach the publisher
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Unique name for this handler (for logging).
    fn name(&self) -> &str;

    /// Handle an event.
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into an [`EventHandler`].
///
/// # Example
///
/// ```ignore
/// let handler = FnHandler::new("audit", |event: Event| async move {
///     tracing::info!(event_type = %event.event_type(), "seen");
///     Ok(())
/// });
/// bus.subscribe(EventType::MatchFinished, Arc::new(handler));
/// ```
pub struct FnHandler<F, Fut> {
    name: String,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _fut: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.f)(event.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Team, Tournament};

    #[tokio::test]
    async fn test_fn_handler_invokes_closure() {
        let handler = FnHandler::new("echo", |event: Event| async move {
            if event.event_type().as_str() == "match.finished" {
                Ok(())
            } else {
                Err(HandlerError::unexpected_payload("echo"))
            }
        });
        assert_eq!(handler.name(), "echo");

        let event = Event::match_finished(1, Tournament::Spring, Team::A, 1, 0);
        assert!(handler.handle(&event).await.is_ok());

        let event = Event::prediction_voted(1, 1, 1, 1);
        let err = handler.handle(&event).await.unwrap_err();
        assert_eq!(err.to_string(), "Unexpected payload for echo");
    }
}
