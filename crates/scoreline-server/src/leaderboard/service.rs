//! Leaderboard cache service.
//!
//! Cache-aside reads over the layered cache. A miss is answered from the
//! repository immediately; filling the cache happens on a spawned task so
//! the caller never waits on it.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scoreline_core::{LeaderboardEntry, SharedClock, Tournament};
use scoreline_storage::UserRepository;

use super::error::{LeaderboardError, LeaderboardResult};
use crate::cache::{LayeredCache, keys};
use crate::config::LeaderboardConfig;
use crate::metrics;
use crate::supervisor::PeriodicTask;

/// Bound on the background write-back after a miss.
pub const FILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on each scheduled refresh.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct LeaderboardCacheConfig {
    pub ttl: Duration,
    pub refresh_interval: Duration,
    pub top_n: usize,
    pub fill_timeout: Duration,
    pub refresh_timeout: Duration,
}

impl Default for LeaderboardCacheConfig {
    fn default() -> Self {
        Self::from(&LeaderboardConfig::default())
    }
}

impl From<&LeaderboardConfig> for LeaderboardCacheConfig {
    fn from(cfg: &LeaderboardConfig) -> Self {
        Self {
            ttl: Duration::from_secs(cfg.ttl_secs),
            refresh_interval: Duration::from_secs(cfg.refresh_interval_secs),
            top_n: cfg.top_n,
            fill_timeout: FILL_TIMEOUT,
            refresh_timeout: REFRESH_TIMEOUT,
        }
    }
}

/// Request counters of the leaderboard cache. `hit_rate` is a percentage
/// derived from the counters at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardCacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
}

impl LeaderboardCacheStats {
    pub(crate) fn from_counts(
        total_requests: u64,
        cache_hits: u64,
        cache_misses: u64,
        last_updated: Option<OffsetDateTime>,
    ) -> Self {
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            cache_hits as f64 / total_requests as f64 * 100.0
        };
        Self {
            total_requests,
            cache_hits,
            cache_misses,
            hit_rate,
            last_updated,
        }
    }
}

// Every request is exactly one hit or one miss; the total is derived.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

pub struct LeaderboardCacheService {
    cache: Arc<LayeredCache>,
    users: Arc<dyn UserRepository>,
    config: LeaderboardCacheConfig,
    clock: SharedClock,
    counters: Counters,
    last_updated: Mutex<Option<OffsetDateTime>>,
    refresh: Mutex<Option<PeriodicTask>>,
}

impl LeaderboardCacheService {
    pub fn new(
        cache: Arc<LayeredCache>,
        users: Arc<dyn UserRepository>,
        config: LeaderboardCacheConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            cache,
            users,
            config,
            clock,
            counters: Counters::default(),
            last_updated: Mutex::new(None),
            refresh: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LeaderboardCacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<LayeredCache> {
        &self.cache
    }

    /// Read a leaderboard, serving from cache when possible.
    pub async fn get_leaderboard(
        &self,
        tournament: Tournament,
    ) -> LeaderboardResult<Vec<LeaderboardEntry>> {
        let key = keys::leaderboard(tournament);

        match self.cache.get_decoded::<Vec<LeaderboardEntry>>(&key).await {
            Ok(entries) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_leaderboard_request(true);
                debug!(tournament = %tournament, "Leaderboard served from cache");
                return Ok(entries);
            }
            Err(e) if e.is_miss() => {}
            Err(e) => {
                warn!(tournament = %tournament, error = %e, "Leaderboard cache read failed");
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_leaderboard_request(false);

        let generation = self.cache.generation();
        let entries = self.users.leaderboard(tournament, self.config.top_n).await?;
        self.spawn_fill(tournament, key, entries.clone(), generation);
        Ok(entries)
    }

    // Skips the write when an invalidation ran after the repository read.
    fn spawn_fill(
        &self,
        tournament: Tournament,
        key: String,
        entries: Vec<LeaderboardEntry>,
        generation: u64,
    ) {
        let cache = Arc::clone(&self.cache);
        let ttl = self.config.ttl;
        let timeout = self.config.fill_timeout;

        tokio::spawn(async move {
            if cache.generation() != generation {
                debug!(tournament = %tournament, "Skipping leaderboard fill after invalidation");
                return;
            }
            match tokio::time::timeout(timeout, cache.set_encoded(&key, &entries, ttl)).await {
                Ok(Ok(())) => debug!(tournament = %tournament, "Leaderboard cached"),
                Ok(Err(e)) => {
                    warn!(tournament = %tournament, error = %e, "Failed to cache leaderboard")
                }
                Err(_) => warn!(tournament = %tournament, "Leaderboard cache fill timed out"),
            }
        });
    }

    /// Drop a cached leaderboard. A non-global tournament also drops `GLOBAL`.
    pub async fn invalidate_leaderboard(&self, tournament: Tournament) -> LeaderboardResult<()> {
        self.cache.delete(&keys::leaderboard(tournament)).await?;
        metrics::record_invalidation("leaderboard");
        debug!(tournament = %tournament, "Leaderboard cache invalidated");

        if !tournament.is_global() {
            if let Err(e) = self
                .cache
                .delete(&keys::leaderboard(Tournament::Global))
                .await
            {
                warn!(error = %e, "Failed to invalidate GLOBAL leaderboard");
            }
        }
        Ok(())
    }

    /// Load a leaderboard from the repository and store it synchronously.
    /// The write is skipped when an invalidation ran after the read.
    pub async fn refresh_cache(&self, tournament: Tournament) -> LeaderboardResult<()> {
        let generation = self.cache.generation();
        let entries = self.users.leaderboard(tournament, self.config.top_n).await?;
        if self.cache.generation() != generation {
            debug!(tournament = %tournament, "Skipping leaderboard refresh after invalidation");
            return Ok(());
        }
        self.cache
            .set_encoded(&keys::leaderboard(tournament), &entries, self.config.ttl)
            .await?;
        *self.last_updated.lock() = Some(self.clock.now());
        debug!(tournament = %tournament, entries = entries.len(), "Leaderboard refreshed");
        Ok(())
    }

    async fn refresh_bounded(&self, tournament: Tournament) -> LeaderboardResult<()> {
        let timeout = self.config.refresh_timeout;
        match tokio::time::timeout(timeout, self.refresh_cache(tournament)).await {
            Ok(result) => result,
            Err(_) => Err(LeaderboardError::timeout("refresh", tournament, timeout)),
        }
    }

    /// Refresh every tournament. Failures are collected, not short-circuited.
    pub async fn prewarm_cache(&self) -> LeaderboardResult<()> {
        let mut failures = Vec::new();
        for tournament in Tournament::ALL {
            if let Err(e) = self.refresh_bounded(tournament).await {
                failures.push((tournament, e));
            }
        }
        info!(
            tournaments = Tournament::ALL.len(),
            failed = failures.len(),
            "Leaderboard cache prewarmed"
        );
        LeaderboardError::collect("prewarm", failures)
    }

    /// Start the periodic refresh. Returns false if it is already running.
    pub fn start_scheduled_refresh(self: &Arc<Self>, parent: &CancellationToken) -> bool {
        let mut slot = self.refresh.lock();
        if slot.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }

        let service = Arc::clone(self);
        *slot = Some(PeriodicTask::spawn(
            "leaderboard-refresh",
            parent,
            self.config.refresh_interval,
            move || {
                let service = Arc::clone(&service);
                async move { service.run_scheduled_refresh().await }
            },
        ));
        info!(
            interval_secs = self.config.refresh_interval.as_secs(),
            "Leaderboard scheduled refresh started"
        );
        true
    }

    /// Stop the periodic refresh. Safe to call when it is not running.
    pub async fn stop_scheduled_refresh(&self) {
        let task = self.refresh.lock().take();
        if let Some(task) = task {
            task.stop().await;
            info!("Leaderboard scheduled refresh stopped");
        }
    }

    pub fn is_refresh_running(&self) -> bool {
        self.refresh
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    async fn run_scheduled_refresh(&self) {
        for tournament in Tournament::ALL {
            if let Err(e) = self.refresh_bounded(tournament).await {
                warn!(tournament = %tournament, error = %e, "Scheduled leaderboard refresh failed");
            }
        }
    }

    pub fn stats(&self) -> LeaderboardCacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        LeaderboardCacheStats::from_counts(hits + misses, hits, misses, *self.last_updated.lock())
    }
}

impl std::fmt::Debug for LeaderboardCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardCacheService")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
