//! Lifecycle of the leaderboard caching services.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scoreline_core::Tournament;

use super::error::LeaderboardResult;
use super::invalidation::InvalidationService;
use super::monitoring::{CacheMetrics, CacheMonitor};
use super::service::LeaderboardCacheService;

/// Bound on flushing deferred invalidations during stop.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub refresh_running: bool,
    pub monitoring_running: bool,
    pub pending_invalidations: usize,
    pub metrics: CacheMetrics,
}

/// Owns the leaderboard cache, its invalidation front and its monitor.
#[derive(Debug)]
pub struct CacheServiceManager {
    leaderboard: Arc<LeaderboardCacheService>,
    invalidation: Arc<InvalidationService>,
    monitor: Arc<CacheMonitor>,
    monitoring_enabled: bool,
}

impl CacheServiceManager {
    pub fn new(
        leaderboard: Arc<LeaderboardCacheService>,
        invalidation: Arc<InvalidationService>,
        monitor: Arc<CacheMonitor>,
        monitoring_enabled: bool,
    ) -> Self {
        Self {
            leaderboard,
            invalidation,
            monitor,
            monitoring_enabled,
        }
    }

    pub fn leaderboard(&self) -> &Arc<LeaderboardCacheService> {
        &self.leaderboard
    }

    pub fn invalidation(&self) -> &Arc<InvalidationService> {
        &self.invalidation
    }

    pub fn monitor(&self) -> &Arc<CacheMonitor> {
        &self.monitor
    }

    /// Start monitoring and scheduled refresh, then prewarm. A failed prewarm
    /// is logged; the cache fills on demand instead.
    pub async fn start(&self, parent: &CancellationToken) {
        if self.monitoring_enabled {
            self.monitor.start_monitoring(parent);
        }
        self.leaderboard.start_scheduled_refresh(parent);

        match self.leaderboard.prewarm_cache().await {
            Ok(()) => info!("Leaderboard cache prewarmed"),
            Err(e) => warn!(error = %e, "Leaderboard prewarm failed, continuing"),
        }
        info!("Cache services started");
    }

    /// Stop the loops and flush pending invalidations.
    pub async fn stop(&self) {
        self.leaderboard.stop_scheduled_refresh().await;
        self.monitor.stop_monitoring().await;

        match tokio::time::timeout(
            FLUSH_TIMEOUT,
            self.invalidation.flush_scheduled_invalidations(),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Flushing invalidations failed"),
            Err(_) => warn!(
                timeout_secs = FLUSH_TIMEOUT.as_secs(),
                "Flushing invalidations timed out"
            ),
        }
        info!("Cache services stopped");
    }

    /// Run a fresh monitoring sample and summarize.
    pub async fn health_check(&self) -> HealthReport {
        let metrics = self.monitor.perform_check().await;
        let health = &metrics.system_health;
        HealthReport {
            healthy: health.remote_connected && health.hit_rate_healthy,
            refresh_running: self.leaderboard.is_refresh_running(),
            monitoring_running: self.monitor.is_monitoring(),
            pending_invalidations: self.invalidation.pending_count(),
            metrics,
        }
    }

    pub fn schedule_batch_invalidation(&self, tournaments: &[Tournament], delay: Duration) {
        for &tournament in tournaments {
            self.invalidation.schedule_invalidation(tournament, delay);
        }
    }

    pub async fn invalidate_now(&self, tournaments: &[Tournament]) -> LeaderboardResult<()> {
        self.invalidation.batch_invalidate(tournaments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryRemoteCache, LayeredCache, MemoryCache};
    use crate::config::MonitoringConfig;
    use crate::leaderboard::LeaderboardCacheConfig;
    use scoreline_core::{User, system_clock};
    use scoreline_db_memory::InMemoryStore;

    fn manager() -> (CacheServiceManager, Arc<LayeredCache>) {
        let store = InMemoryStore::new_shared();
        store.insert_user(User::new(1, "alice"));
        let cache = Arc::new(LayeredCache::new(
            Arc::new(MemoryCache::default()),
            InMemoryRemoteCache::new_shared(),
        ));
        let leaderboard = Arc::new(LeaderboardCacheService::new(
            Arc::clone(&cache),
            store.repositories().users,
            LeaderboardCacheConfig::default(),
            system_clock(),
        ));
        let invalidation = Arc::new(InvalidationService::new(Arc::clone(&leaderboard)));
        let monitor = Arc::new(CacheMonitor::new(
            Arc::clone(&leaderboard),
            Arc::clone(&cache),
            MonitoringConfig::default(),
            system_clock(),
        ));
        (
            CacheServiceManager::new(leaderboard, invalidation, monitor, true),
            cache,
        )
    }

    #[tokio::test]
    async fn test_start_prewarms_and_stop_flushes() {
        let (mgr, cache) = manager();
        let token = CancellationToken::new();
        mgr.start(&token).await;

        assert!(mgr.leaderboard().is_refresh_running());
        assert!(mgr.monitor().is_monitoring());
        for t in Tournament::ALL {
            assert!(cache.exists(&crate::cache::keys::leaderboard(t)).await.unwrap());
        }

        mgr.schedule_batch_invalidation(&[Tournament::Spring], Duration::from_secs(600));
        mgr.stop().await;
        assert_eq!(mgr.invalidation().pending_count(), 0);
        assert!(!mgr.leaderboard().is_refresh_running());
        assert!(!mgr.monitor().is_monitoring());
        assert!(!cache.exists("leaderboard:SPRING").await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_reports_state() {
        let (mgr, _) = manager();
        let report = mgr.health_check().await;
        assert!(report.healthy);
        assert!(!report.refresh_running);
        assert_eq!(report.pending_invalidations, 0);
    }
}
