//! Publish/subscribe buses.
//!
//! Two flavours share the [`EventBus`] contract:
//!
//! - [`InMemoryEventBus`]: handlers run inline on the publisher's task
//! - [`AsyncEventBus`]: publish enqueues into a bounded queue drained by a
//!   bus-owned dispatcher task
//!
//! ```text
//! publish ──► [ bounded queue ] ──► dispatcher ──► handler 1 ─► handler 2 ─► ...
//!     │ full
//!     └──► EventBusError::QueueFull (event dropped, warning logged)
//! ```
//!
//! The async bus never blocks the publisher: a full queue drops the event and
//! reports `QueueFull`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handlers::EventHandler;
use super::registry::{HandlerRegistry, SubscriptionId};
use super::types::{Event, EventType};

/// Default queue capacity of the async bus.
pub const DEFAULT_ASYNC_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    #[error("event queue is full (capacity {capacity}), {event_type} dropped")]
    QueueFull {
        capacity: usize,
        event_type: EventType,
    },

    #[error("event bus is shutting down")]
    ShuttingDown,
}

/// In-process publish/subscribe contract.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event. Handler failures never surface here.
    async fn publish(&self, event: Event) -> Result<(), EventBusError>;

    /// Register a handler for one event type. Handlers of the same type are
    /// invoked in subscription order.
    fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> SubscriptionId;

    /// Remove a subscription. Returns false if it was unknown.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Number of handlers subscribed to `event_type`.
    fn handler_count(&self, event_type: EventType) -> usize;

    /// Stop accepting events and drain whatever is queued, bounded by
    /// `timeout`. Buses without a queue have nothing to drain.
    async fn close(&self, _timeout: Duration) {}
}

pub type SharedEventBus = Arc<dyn EventBus>;

// ============================================================================
// Synchronous bus
// ============================================================================

/// Bus that dispatches on the publisher's task.
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    registry: Arc<HandlerRegistry>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> Result<(), EventBusError> {
        let report = self.registry.dispatch(&event).await;
        debug!(
            event_type = %event.event_type(),
            delivered = report.delivered,
            failed = report.failed,
            "Event published"
        );
        Ok(())
    }

    fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.registry.subscribe(event_type, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    fn handler_count(&self, event_type: EventType) -> usize {
        self.registry.handler_count(event_type)
    }
}

// ============================================================================
// Asynchronous bus
// ============================================================================

/// Bus with a bounded intake queue and a single dispatcher task.
///
/// Events from one publisher are dispatched in publish order; events from
/// concurrent publishers interleave.
pub struct AsyncEventBus {
    registry: Arc<HandlerRegistry>,
    sender: Mutex<Option<mpsc::Sender<Event>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl AsyncEventBus {
    /// Create the bus and spawn its dispatcher. Must be called inside a
    /// tokio runtime.
    pub fn start(capacity: usize) -> Self {
        Self::start_with_registry(capacity, Arc::new(HandlerRegistry::new()))
    }

    pub fn start_with_registry(capacity: usize, registry: Arc<HandlerRegistry>) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let dispatcher = tokio::spawn(run_dispatcher(registry.clone(), receiver));
        info!(capacity, "Async event bus started");
        Self {
            registry,
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events waiting for dispatch.
    pub fn queue_len(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map_or(0, |s| s.max_capacity() - s.capacity())
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Stop accepting events and wait up to `timeout` for queued ones to be
    /// dispatched. Idempotent.
    pub async fn shutdown(&self, timeout: Duration) {
        // dropping the only sender closes the queue once drained
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(timeout, handle).await {
                Ok(_) => info!("Async event bus drained"),
                Err(_) => warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Async event bus did not drain before timeout"
                ),
            }
        }
    }
}

async fn run_dispatcher(registry: Arc<HandlerRegistry>, mut receiver: mpsc::Receiver<Event>) {
    debug!("Starting event dispatcher");
    while let Some(event) = receiver.recv().await {
        registry.dispatch(&event).await;
    }
    debug!("Event dispatcher channel closed, stopping");
}

#[async_trait]
impl EventBus for AsyncEventBus {
    async fn publish(&self, event: Event) -> Result<(), EventBusError> {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(EventBusError::ShuttingDown);
        };

        let event_type = event.event_type();
        match sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    event_type = %event_type,
                    capacity = self.capacity,
                    "Event queue full, dropping event"
                );
                Err(EventBusError::QueueFull {
                    capacity: self.capacity,
                    event_type,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EventBusError::ShuttingDown),
        }
    }

    fn subscribe(&self, event_type: EventType, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.registry.subscribe(event_type, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    fn handler_count(&self, event_type: EventType) -> usize {
        self.registry.handler_count(event_type)
    }

    async fn close(&self, timeout: Duration) {
        self.shutdown(timeout).await;
    }
}

impl std::fmt::Debug for AsyncEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncEventBus")
            .field("capacity", &self.capacity)
            .field("queue_len", &self.queue_len())
            .field("registry", &self.registry)
            .finish()
    }
}
