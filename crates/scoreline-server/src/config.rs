use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Redis configuration (remote cache tier)
    #[serde(default)]
    pub redis: RedisConfig,
    /// Two-tier cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub hot_predictions: HotPredictionsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Redis validation
        if self.redis.enabled && self.redis.url.trim().is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        // Cache validation
        if self.cache.memory_ttl_ceiling_secs == 0 {
            return Err("cache.memory_ttl_ceiling_secs must be > 0".into());
        }
        if self.cache.repopulate_ttl_secs == 0 {
            return Err("cache.repopulate_ttl_secs must be > 0".into());
        }
        if self.cache.repopulate_ttl_secs > self.cache.memory_ttl_ceiling_secs {
            return Err(
                "cache.repopulate_ttl_secs must be <= cache.memory_ttl_ceiling_secs".into(),
            );
        }
        if self.cache.max_entries == 0 {
            return Err("cache.max_entries must be > 0".into());
        }
        // Scoring validation
        if self.scoring.queue_capacity == 0 {
            return Err("scoring.queue_capacity must be > 0".into());
        }
        if self.scoring.workers == 0 {
            return Err("scoring.workers must be > 0".into());
        }
        // Leaderboard validation
        if self.leaderboard.ttl_secs == 0 || self.leaderboard.refresh_interval_secs == 0 {
            return Err("leaderboard ttl and refresh interval must be > 0".into());
        }
        if self.cache.memory_ttl_ceiling_secs > self.leaderboard.ttl_secs {
            return Err("cache.memory_ttl_ceiling_secs must be <= leaderboard.ttl_secs".into());
        }
        if self.leaderboard.top_n == 0 {
            return Err("leaderboard.top_n must be > 0".into());
        }
        // Monitoring validation
        if !(0.0..=100.0).contains(&self.monitoring.hit_rate_threshold) {
            return Err("monitoring.hit_rate_threshold must be within 0..=100".into());
        }
        if self.monitoring.interval_secs == 0 {
            return Err("monitoring.interval_secs must be > 0".into());
        }
        // Event bus validation
        if self.event_bus.queue_capacity == 0 {
            return Err("event_bus.queue_capacity must be > 0".into());
        }
        if self.event_bus.handler_timeout_secs == 0 {
            return Err("event_bus.handler_timeout_secs must be > 0".into());
        }
        // Hot predictions validation
        if self.hot_predictions.cache_ttl_secs == 0
            || self.hot_predictions.cleanup_interval_secs == 0
        {
            return Err("hot_predictions cache ttl and cleanup interval must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Include the emitting module path in each line
    #[serde(default = "default_true")]
    pub with_target: bool,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            with_target: true,
        }
    }
}

/// Line layout of the fmt subscriber.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// Redis configuration for the shared cache tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades to an in-process tier without it)
    #[serde(default)]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on memory-tier TTLs
    #[serde(default = "default_memory_ttl_ceiling_secs")]
    pub memory_ttl_ceiling_secs: u64,
    /// TTL for memory entries copied back from the remote tier
    #[serde(default = "default_repopulate_ttl_secs")]
    pub repopulate_ttl_secs: u64,
    /// Memory tier entry bound
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
    /// Interval of the memory-tier expiry sweep
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_memory_ttl_ceiling_secs() -> u64 {
    60
}
fn default_repopulate_ttl_secs() -> u64 {
    30
}
fn default_cache_max_entries() -> usize {
    10_000
}
fn default_cleanup_interval_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl_ceiling_secs: default_memory_ttl_ceiling_secs(),
            repopulate_ttl_secs: default_repopulate_ttl_secs(),
            max_entries: default_cache_max_entries(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn memory_ttl_ceiling(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_ceiling_secs)
    }
    pub fn repopulate_ttl(&self) -> Duration {
        Duration::from_secs(self.repopulate_ttl_secs)
    }
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Bounded intake queue for scoring tasks
    #[serde(default = "default_scoring_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_scoring_workers")]
    pub workers: usize,
    /// Finished tasks kept for status lookups
    #[serde(default = "default_scoring_history")]
    pub history_size: usize,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_scoring_queue_capacity() -> usize {
    100
}
fn default_scoring_workers() -> usize {
    5
}
fn default_scoring_history() -> usize {
    256
}
fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_scoring_queue_capacity(),
            workers: default_scoring_workers(),
            history_size: default_scoring_history(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ScoringConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    #[serde(default = "default_leaderboard_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Refresh leaderboards right after points are recalculated
    #[serde(default = "default_true")]
    pub refresh_on_points: bool,
}

fn default_leaderboard_ttl_secs() -> u64 {
    300
}
fn default_refresh_interval_secs() -> u64 {
    120
}
fn default_top_n() -> usize {
    50
}
fn default_true() -> bool {
    true
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_leaderboard_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            top_n: default_top_n(),
            refresh_on_points: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,
    /// Hit-rate percentage below which a warning is raised
    #[serde(default = "default_hit_rate_threshold")]
    pub hit_rate_threshold: f64,
    /// Requests needed before the hit rate is judged
    #[serde(default = "default_min_requests")]
    pub min_requests: u64,
    #[serde(default = "default_slow_probe_ms")]
    pub slow_probe_ms: u64,
}

fn default_monitor_interval_secs() -> u64 {
    60
}
fn default_hit_rate_threshold() -> f64 {
    90.0
}
fn default_min_requests() -> u64 {
    10
}
fn default_slow_probe_ms() -> u64 {
    1000
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_monitor_interval_secs(),
            hit_rate_threshold: default_hit_rate_threshold(),
            min_requests: default_min_requests(),
            slow_probe_ms: default_slow_probe_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventBusMode {
    /// Handlers run on the publisher's task
    Sync,
    /// Bounded queue drained by a dispatcher task
    #[default]
    Async,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default)]
    pub mode: EventBusMode,
    #[serde(default = "default_bus_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
}

fn default_bus_queue_capacity() -> usize {
    1000
}
fn default_handler_timeout_secs() -> u64 {
    30
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            mode: EventBusMode::default(),
            queue_capacity: default_bus_queue_capacity(),
            handler_timeout_secs: default_handler_timeout_secs(),
        }
    }
}

impl EventBusConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotPredictionsConfig {
    #[serde(default = "default_hot_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Entries carried in the hot-predictions update event
    #[serde(default = "default_publish_top")]
    pub publish_top: usize,
    #[serde(default = "default_hot_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_hot_cache_ttl_secs() -> u64 {
    300
}
fn default_publish_top() -> usize {
    10
}
fn default_hot_cleanup_interval_secs() -> u64 {
    600
}

impl Default for HotPredictionsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_hot_cache_ttl_secs(),
            publish_top: default_publish_top(),
            cleanup_interval_secs: default_hot_cleanup_interval_secs(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file looked up when no path is given.
    pub const DEFAULT_CONFIG_PATH: &str = "scoreline.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., SCORELINE__SCORING__WORKERS=8
        builder = builder.add_source(
            Environment::with_prefix("SCORELINE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
