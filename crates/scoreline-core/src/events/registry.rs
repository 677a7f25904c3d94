//! Handler registry shared by both bus flavours.
//!
//! The registry keeps subscriptions per event type in subscription order and
//! dispatches one event to them sequentially, each call guarded by a timeout
//! and panic recovery.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::handlers::EventHandler;
use super::types::{Event, EventType};

/// Default timeout for a single handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

// ============================================================================
// Handler Registry
// ============================================================================

pub struct HandlerRegistry {
    handlers: RwLock<HashMap<EventType, Vec<Subscription>>>,
    timeout: Duration,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_HANDLER_TIMEOUT)
    }

    /// Create a new registry with custom handler timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Append a handler to the list for `event_type`.
    pub fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId::new();
        let name = handler.name().to_string();
        self.handlers
            .write()
            .entry(event_type)
            .or_default()
            .push(Subscription { id, handler });
        debug!(handler = %name, event_type = %event_type, subscription = %id, "Subscribed handler");
        id
    }

    /// Remove a subscription. Returns false if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        for subs in handlers.values_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == id) {
                let removed = subs.remove(pos);
                debug!(handler = %removed.handler.name(), subscription = %id, "Unsubscribed handler");
                return true;
            }
        }
        false
    }

    /// Number of handlers subscribed to `event_type`.
    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers
            .read()
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    /// Total number of subscriptions across all event types.
    pub fn total_handlers(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Deliver `event` to every handler of its type, in subscription order.
    ///
    /// The subscription list is snapshotted first, so handlers may subscribe
    /// or unsubscribe (or publish) while being dispatched.
    pub async fn dispatch(&self, event: &Event) -> DispatchReport {
        let event_type = event.event_type();
        let subscribers: Vec<Subscription> = self
            .handlers
            .read()
            .get(&event_type)
            .cloned()
            .unwrap_or_default();

        if subscribers.is_empty() {
            debug!(event_type = %event_type, "No handlers for event");
            return DispatchReport::default();
        }

        let mut report = DispatchReport::default();
        for sub in subscribers {
            if self.invoke(&sub.handler, event).await {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    async fn invoke(&self, handler: &Arc<dyn EventHandler>, event: &Event) -> bool {
        let handler_name = handler.name().to_string();
        let event_type = event.event_type();

        let result = tokio::time::timeout(self.timeout, async {
            AssertUnwindSafe(handler.handle(event)).catch_unwind().await
        })
        .await;

        match result {
            Ok(Ok(Ok(()))) => {
                debug!(handler = %handler_name, event_type = %event_type, "Handler executed successfully");
                true
            }
            Ok(Ok(Err(e))) => {
                warn!(
                    handler = %handler_name,
                    event_type = %event_type,
                    error = %e,
                    "Handler execution failed"
                );
                false
            }
            Ok(Err(panic)) => {
                let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                error!(
                    handler = %handler_name,
                    event_type = %event_type,
                    panic = %panic_msg,
                    "Handler panicked"
                );
                false
            }
            Err(_) => {
                error!(
                    handler = %handler_name,
                    event_type = %event_type,
                    timeout_secs = self.timeout.as_secs(),
                    "Handler timed out"
                );
                false
            }
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("timeout", &self.timeout)
            .field("handlers", &self.total_handlers())
            .finish()
    }
}
