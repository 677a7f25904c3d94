//! Publishing helper shared by the server's event producers.

use tracing::{debug, warn};

use scoreline_core::events::{Event, EventBus, EventBusError};

use crate::metrics;

/// Publish `event`, recording the outcome. Failures are logged and returned;
/// callers treat them as non-fatal.
pub async fn publish(bus: &dyn EventBus, event: Event) -> Result<(), EventBusError> {
    let event_type = event.event_type();
    match bus.publish(event).await {
        Ok(()) => {
            metrics::record_event_publish(event_type.as_str(), "published");
            debug!(event_type = %event_type, "Event published");
            Ok(())
        }
        Err(e) => {
            let outcome = match e {
                EventBusError::QueueFull { .. } => "dropped",
                EventBusError::ShuttingDown => "rejected",
            };
            metrics::record_event_publish(event_type.as_str(), outcome);
            warn!(event_type = %event_type, error = %e, "Failed to publish event");
            Err(e)
        }
    }
}
