//! Asynchronous scoring pipeline and its event wiring.

pub mod error;
pub mod integration;
pub mod service;

pub use error::{ScoringError, ScoringResult};
pub use integration::{
    LeaderboardUpdateHandler, MatchFinishHandler, PointsNotificationHandler, ScoringIntegration,
};
pub use service::{AsyncPointsService, QueueStatus, ScoringServiceConfig, ScoringTask, TaskStatus};
