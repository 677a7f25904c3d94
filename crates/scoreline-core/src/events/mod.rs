//! In-process event system for the scoring pipeline.
//!
//! # Architecture
//!
//! ```text
//!  publisher ──► EventBus (sync or async) ──► HandlerRegistry
//!                                                  │ per event type, in order
//!                                  ┌───────────────┼───────────────┐
//!                                  ▼               ▼               ▼
//!                             handler 1        handler 2        handler 3
//!                        (timeout + panic recovery around every call)
//! ```
//!
//! # Module Structure
//!
//! - [`types`]: `EventType`, typed payloads, `Event`
//! - [`handlers`]: `EventHandler` trait, `FnHandler` adapter, `HandlerError`
//! - [`registry`]: subscription bookkeeping and isolated dispatch
//! - [`bus`]: `EventBus` trait with `InMemoryEventBus` and `AsyncEventBus`

pub mod bus;
pub mod handlers;
pub mod registry;
pub mod types;

pub use bus::{
    AsyncEventBus, DEFAULT_ASYNC_QUEUE_CAPACITY, EventBus, EventBusError, InMemoryEventBus,
    SharedEventBus,
};
pub use handlers::{EventHandler, FnHandler, HandlerError};
pub use registry::{DEFAULT_HANDLER_TIMEOUT, DispatchReport, HandlerRegistry, SubscriptionId};
pub use types::{
    Event, EventPayload, EventType, HotPredictionsUpdatedPayload, LeaderboardUpdatedPayload,
    MatchFinishedPayload, MatchPayload, MatchScorePayload, MatchStatusChangedPayload,
    PointsCalculatedPayload, PredictionPayload, PredictionPoints, PredictionVotedPayload,
    UserRegisteredPayload,
};
