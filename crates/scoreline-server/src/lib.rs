pub mod cache;
pub mod config;
pub mod events;
pub mod leaderboard;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod scoring;
pub mod supervisor;
pub mod views;

pub use cache::{
    CacheError, InMemoryRemoteCache, LayeredCache, MemoryCache, RemoteCache, SharedRemoteCache,
    create_remote_cache,
};
pub use config::{
    AppConfig, CacheConfig, EventBusConfig, EventBusMode, LeaderboardConfig, LoggingConfig,
    MonitoringConfig, RedisConfig, ScoringConfig,
};
pub use leaderboard::{
    CacheMonitor, CacheServiceManager, InvalidationService, LeaderboardCacheService,
    LeaderboardError,
};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with};
pub use pipeline::Pipeline;
pub use scoring::{AsyncPointsService, ScoringError, ScoringIntegration, TaskStatus};
pub use supervisor::Supervisor;
pub use views::{HotPredictionsService, MatchCacheService};
