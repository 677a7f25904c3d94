//! Leaderboard caching: read-through service, targeted and debounced
//! invalidation, monitoring, and the manager tying their lifecycles together.

pub mod error;
pub mod invalidation;
pub mod manager;
pub mod monitoring;
pub mod service;

pub use error::{LeaderboardError, LeaderboardResult};
pub use invalidation::InvalidationService;
pub use manager::{CacheServiceManager, HealthReport};
pub use monitoring::{Alert, AlertLevel, CacheMetrics, CacheMonitor, CacheReport, HourlyStats};
pub use service::{LeaderboardCacheConfig, LeaderboardCacheService, LeaderboardCacheStats};
