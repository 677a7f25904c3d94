//! Cache monitoring: periodic sampling, threshold alerts, hourly history.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scoreline_core::{SharedClock, Tournament};

use super::service::{LeaderboardCacheService, LeaderboardCacheStats};
use crate::cache::{LayeredCache, LayeredCacheStats};
use crate::config::MonitoringConfig;
use crate::metrics;
use crate::supervisor::PeriodicTask;

pub const MAX_ALERTS: usize = 100;
pub const HISTORY_HOURS: usize = 24;

/// Bound on the remote-tier connectivity check.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub remote_connected: bool,
    pub hit_rate_healthy: bool,
    /// Latency of the synthetic `GLOBAL` read; `-1` when it failed.
    pub response_time_ms: f64,
    pub memory_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub leaderboard_stats: LeaderboardCacheStats,
    pub cache_stats: LayeredCacheStats,
    pub system_health: SystemHealth,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_check: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyStats {
    #[serde(with = "time::serde::rfc3339")]
    pub hour: OffsetDateTime,
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_response_ms: f64,
    #[serde(skip)]
    probe_total_ms: f64,
    #[serde(skip)]
    probe_samples: u64,
}

impl HourlyStats {
    fn record_probe(&mut self, response_ms: f64) {
        if response_ms >= 0.0 {
            self.probe_total_ms += response_ms;
            self.probe_samples += 1;
            self.avg_response_ms = self.probe_total_ms / self.probe_samples as f64;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub summary: CacheMetrics,
    pub hourly_stats: Vec<HourlyStats>,
    pub recommendations: Vec<String>,
    pub alerts: Vec<Alert>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

#[derive(Debug)]
struct MonitorState {
    current: CacheMetrics,
    hourly: VecDeque<HourlyStats>,
    alerts: VecDeque<Alert>,
}

pub struct CacheMonitor {
    leaderboard: Arc<LeaderboardCacheService>,
    cache: Arc<LayeredCache>,
    config: MonitoringConfig,
    clock: SharedClock,
    state: Mutex<MonitorState>,
    task: Mutex<Option<PeriodicTask>>,
}

impl CacheMonitor {
    pub fn new(
        leaderboard: Arc<LeaderboardCacheService>,
        cache: Arc<LayeredCache>,
        config: MonitoringConfig,
        clock: SharedClock,
    ) -> Self {
        let current = CacheMetrics {
            leaderboard_stats: leaderboard.stats(),
            cache_stats: cache.stats(),
            system_health: SystemHealth {
                remote_connected: true,
                hit_rate_healthy: true,
                response_time_ms: 0.0,
                memory_entries: 0,
            },
            last_check: None,
        };
        Self {
            leaderboard,
            cache,
            config,
            clock,
            state: Mutex::new(MonitorState {
                current,
                hourly: VecDeque::with_capacity(HISTORY_HOURS),
                alerts: VecDeque::with_capacity(MAX_ALERTS),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start periodic checks. Returns false if already running.
    pub fn start_monitoring(self: &Arc<Self>, parent: &CancellationToken) -> bool {
        let mut slot = self.task.lock();
        if slot.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }
        let monitor = Arc::clone(self);
        *slot = Some(PeriodicTask::spawn(
            "cache-monitor",
            parent,
            Duration::from_secs(self.config.interval_secs),
            move || {
                let monitor = Arc::clone(&monitor);
                async move {
                    monitor.perform_check().await;
                }
            },
        ));
        info!(
            interval_secs = self.config.interval_secs,
            threshold = self.config.hit_rate_threshold,
            "Cache monitoring started"
        );
        true
    }

    pub async fn stop_monitoring(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.stop().await;
            info!("Cache monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Take one sample: stats first, then the connectivity check and the
    /// timed `GLOBAL` probe. Alerts are evaluated on the sample.
    pub async fn perform_check(&self) -> CacheMetrics {
        let started = Instant::now();
        let leaderboard_stats = self.leaderboard.stats();
        let cache_stats = self.cache.stats();

        let remote_connected =
            match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, self.cache.ping()).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    debug!(error = %e, "Remote cache ping failed");
                    false
                }
                Err(_) => false,
            };

        let probe_start = Instant::now();
        let response_time_ms = match self.leaderboard.get_leaderboard(Tournament::Global).await {
            Ok(_) => probe_start.elapsed().as_secs_f64() * 1000.0,
            Err(e) => {
                warn!(error = %e, "Leaderboard probe failed");
                -1.0
            }
        };

        let metrics = CacheMetrics {
            system_health: SystemHealth {
                remote_connected,
                hit_rate_healthy: self.is_hit_rate_healthy(&leaderboard_stats),
                response_time_ms,
                memory_entries: cache_stats.memory_entries,
            },
            leaderboard_stats,
            cache_stats,
            last_check: Some(self.clock.now()),
        };

        {
            let mut state = self.state.lock();
            state.current = metrics.clone();
            self.record_hourly(&mut state, &metrics);
            self.check_alerts(&mut state, &metrics);
        }
        metrics::set_cache_entries(metrics.cache_stats.memory_entries);

        debug!(
            hit_rate = metrics.leaderboard_stats.hit_rate,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache monitoring check completed"
        );
        metrics
    }

    fn is_hit_rate_healthy(&self, stats: &LeaderboardCacheStats) -> bool {
        stats.total_requests <= self.config.min_requests
            || stats.hit_rate >= self.config.hit_rate_threshold
    }

    // one bucket per clock hour, newest last
    fn record_hourly(&self, state: &mut MonitorState, metrics: &CacheMetrics) {
        let now = self.clock.now();
        let hour = now.replace_time(time::Time::MIDNIGHT) + time::Duration::hours(now.hour().into());
        let stats = &metrics.leaderboard_stats;

        let needs_bucket = state.hourly.back().is_none_or(|last| last.hour < hour);
        if needs_bucket {
            state.hourly.push_back(HourlyStats {
                hour,
                requests: 0,
                hits: 0,
                misses: 0,
                hit_rate: 0.0,
                avg_response_ms: 0.0,
                probe_total_ms: 0.0,
                probe_samples: 0,
            });
            while state.hourly.len() > HISTORY_HOURS {
                state.hourly.pop_front();
            }
        }

        if let Some(bucket) = state.hourly.back_mut() {
            bucket.requests = stats.total_requests;
            bucket.hits = stats.cache_hits;
            bucket.misses = stats.cache_misses;
            bucket.hit_rate = stats.hit_rate;
            bucket.record_probe(metrics.system_health.response_time_ms);
        }
    }

    fn check_alerts(&self, state: &mut MonitorState, metrics: &CacheMetrics) {
        let now = self.clock.now();
        let stats = &metrics.leaderboard_stats;
        let health = &metrics.system_health;
        let mut raised = Vec::new();

        if stats.total_requests > self.config.min_requests
            && stats.hit_rate < self.config.hit_rate_threshold
        {
            let message = format!(
                "Cache hit rate ({:.1}%) is below threshold ({:.1}%)",
                stats.hit_rate, self.config.hit_rate_threshold
            );
            warn!(alert = %message, "Cache hit rate alert");
            raised.push((AlertLevel::Warning, message));
        }

        if !health.remote_connected {
            let message = "Remote cache connection is not available".to_string();
            error!(alert = %message, "Remote cache alert");
            raised.push((AlertLevel::Critical, message));
        }

        if health.response_time_ms > self.config.slow_probe_ms as f64 {
            let message = format!(
                "Cache response time ({:.1}ms) is high",
                health.response_time_ms
            );
            warn!(alert = %message, "Response time alert");
            raised.push((AlertLevel::Warning, message));
        }

        for (level, message) in raised {
            metrics::record_cache_alert(level.as_str());
            state.alerts.push_back(Alert {
                level,
                message,
                timestamp: now,
                resolved: false,
            });
        }
        while state.alerts.len() > MAX_ALERTS {
            state.alerts.pop_front();
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().current.clone()
    }

    /// Whether the live hit rate meets the threshold. Too few requests to
    /// judge counts as healthy.
    pub fn check_hit_rate_threshold(&self) -> bool {
        self.is_hit_rate_healthy(&self.leaderboard.stats())
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().alerts.iter().cloned().collect()
    }

    pub fn hourly_stats(&self) -> Vec<HourlyStats> {
        self.state.lock().hourly.iter().cloned().collect()
    }

    pub fn detailed_report(&self) -> CacheReport {
        let state = self.state.lock();
        CacheReport {
            recommendations: recommendations(&state.current, self.config.min_requests),
            summary: state.current.clone(),
            hourly_stats: state.hourly.iter().cloned().collect(),
            alerts: state.alerts.iter().cloned().collect(),
            generated_at: self.clock.now(),
        }
    }
}

fn recommendations(metrics: &CacheMetrics, min_requests: u64) -> Vec<String> {
    let mut out = Vec::new();
    let stats = &metrics.leaderboard_stats;

    if stats.total_requests > min_requests && stats.hit_rate < 80.0 {
        out.push("Consider increasing cache expiration time to improve hit rate".to_string());
        out.push("Implement cache prewarming for frequently accessed tournaments".to_string());
    }
    if metrics.system_health.response_time_ms > 500.0 {
        out.push("Consider optimizing database queries for leaderboard data".to_string());
        out.push("Review Redis configuration and network latency".to_string());
    }
    if stats.total_requests > 10_000 {
        out.push("Consider implementing multiple cache layers".to_string());
        out.push("Monitor Redis memory usage and consider scaling".to_string());
    }
    if out.is_empty() {
        out.push("Cache performance is optimal".to_string());
    }
    out
}

impl std::fmt::Debug for CacheMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMonitor")
            .field("config", &self.config)
            .field("monitoring", &self.is_monitoring())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryRemoteCache, MemoryCache};
    use crate::leaderboard::LeaderboardCacheConfig;
    use scoreline_core::{ManualClock, User};
    use scoreline_db_memory::InMemoryStore;
    use time::macros::datetime;

    struct Fixture {
        monitor: Arc<CacheMonitor>,
        remote: Arc<InMemoryRemoteCache>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new_shared();
        store.insert_user(User::new(1, "alice"));
        let remote = InMemoryRemoteCache::new_shared();
        let cache = Arc::new(LayeredCache::new(
            Arc::new(MemoryCache::default()),
            remote.clone(),
        ));
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 10:15 UTC)));
        let leaderboard = Arc::new(LeaderboardCacheService::new(
            Arc::clone(&cache),
            store.repositories().users,
            LeaderboardCacheConfig::default(),
            clock.clone(),
        ));
        let monitor = Arc::new(CacheMonitor::new(
            leaderboard,
            cache,
            MonitoringConfig::default(),
            clock.clone(),
        ));
        Fixture {
            monitor,
            remote,
            clock,
        }
    }

    #[tokio::test]
    async fn test_remote_outage_raises_critical() {
        let f = fixture();
        f.remote.set_available(false);

        let metrics = f.monitor.perform_check().await;
        assert!(!metrics.system_health.remote_connected);

        let alerts = f.monitor.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
    }

    #[tokio::test]
    async fn test_quiet_cache_is_healthy() {
        let f = fixture();
        let metrics = f.monitor.perform_check().await;
        assert!(metrics.system_health.remote_connected);
        assert!(metrics.system_health.hit_rate_healthy);
        assert!(f.monitor.alerts().is_empty());
        assert!(f.monitor.check_hit_rate_threshold());
    }

    #[tokio::test]
    async fn test_hourly_buckets_never_duplicate() {
        let f = fixture();
        f.monitor.perform_check().await;
        f.clock.advance(time::Duration::minutes(20));
        f.monitor.perform_check().await;
        assert_eq!(f.monitor.hourly_stats().len(), 1);

        f.clock.advance(time::Duration::minutes(30));
        f.monitor.perform_check().await;
        let hourly = f.monitor.hourly_stats();
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0].hour, datetime!(2024-06-01 10:00 UTC));
        assert_eq!(hourly[1].hour, datetime!(2024-06-01 11:00 UTC));
    }

    #[tokio::test]
    async fn test_history_keeps_last_24_hours() {
        let f = fixture();
        for _ in 0..30 {
            f.monitor.perform_check().await;
            f.clock.advance(time::Duration::hours(1));
        }
        assert_eq!(f.monitor.hourly_stats().len(), HISTORY_HOURS);
    }

    #[tokio::test]
    async fn test_alert_ring_is_capped() {
        let f = fixture();
        f.remote.set_available(false);
        for _ in 0..(MAX_ALERTS + 20) {
            f.monitor.perform_check().await;
        }
        assert_eq!(f.monitor.alerts().len(), MAX_ALERTS);
    }

    #[tokio::test]
    async fn test_report_recommends_optimal_when_quiet() {
        let f = fixture();
        f.monitor.perform_check().await;
        let report = f.monitor.detailed_report();
        assert_eq!(report.recommendations, vec!["Cache performance is optimal"]);
        assert_eq!(report.hourly_stats.len(), 1);
    }
}
