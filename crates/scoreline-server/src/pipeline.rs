//! Assembly of the scoring pipeline and cache services.
//!
//! ```text
//!                    ┌──────────── Supervisor (root CancellationToken) ───────────┐
//!                    │ memory sweep · leaderboard refresh · monitor · hot cleanup │
//!                    └────────────────────────────────────────────────────────────┘
//! match.finished ─► EventBus ─► MatchFinishHandler ─► AsyncPointsService (W workers)
//!                      ▲                                      │
//!                      └──────────── points.calculated ◄──────┘
//!                                 │
//!                     LeaderboardUpdateHandler ─► InvalidationService ─► LayeredCache
//! ```

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use scoreline_core::events::{
    AsyncEventBus, Event, EventBusError, HandlerRegistry, InMemoryEventBus, SharedEventBus,
    SubscriptionId,
};
use scoreline_core::{Match, SharedClock, Team};
use scoreline_storage::Repositories;

use crate::cache::{LayeredCache, LayeredCacheConfig, MemoryCache, SharedRemoteCache};
use crate::config::{AppConfig, EventBusMode};
use crate::events;
use crate::leaderboard::{
    CacheMonitor, CacheServiceManager, InvalidationService, LeaderboardCacheConfig,
    LeaderboardCacheService,
};
use crate::scoring::{AsyncPointsService, ScoringIntegration, ScoringServiceConfig};
use crate::supervisor::Supervisor;
use crate::views::{HotPredictionsService, MatchCacheService};

/// Bound on joining the supervised loops at shutdown.
const SUPERVISOR_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Every long-lived service of the server, wired together.
pub struct Pipeline {
    config: AppConfig,
    supervisor: Supervisor,
    cache: Arc<LayeredCache>,
    bus: SharedEventBus,
    manager: CacheServiceManager,
    scoring: ScoringIntegration,
    hot_predictions: Arc<HotPredictionsService>,
    hot_subscriptions: Vec<SubscriptionId>,
    matches: MatchCacheService,
}

impl Pipeline {
    /// Build every service. Must be called inside a tokio runtime; the
    /// scoring workers and the async bus dispatcher start immediately.
    pub fn build(
        config: AppConfig,
        repos: Repositories,
        remote: SharedRemoteCache,
        clock: SharedClock,
    ) -> Self {
        let memory = Arc::new(MemoryCache::new(config.cache.max_entries));
        let cache = Arc::new(LayeredCache::with_config(
            memory,
            remote,
            LayeredCacheConfig {
                memory_ttl_ceiling: config.cache.memory_ttl_ceiling(),
                repopulate_ttl: config.cache.repopulate_ttl(),
            },
        ));

        let registry = Arc::new(HandlerRegistry::with_timeout(config.event_bus.handler_timeout()));
        let bus: SharedEventBus = match config.event_bus.mode {
            EventBusMode::Sync => Arc::new(InMemoryEventBus::with_registry(registry)),
            EventBusMode::Async => Arc::new(AsyncEventBus::start_with_registry(
                config.event_bus.queue_capacity,
                registry,
            )),
        };

        let leaderboard = Arc::new(LeaderboardCacheService::new(
            Arc::clone(&cache),
            Arc::clone(&repos.users),
            LeaderboardCacheConfig::from(&config.leaderboard),
            Arc::clone(&clock),
        ));
        let invalidation = Arc::new(InvalidationService::new(Arc::clone(&leaderboard)));
        let monitor = Arc::new(CacheMonitor::new(
            Arc::clone(&leaderboard),
            Arc::clone(&cache),
            config.monitoring.clone(),
            Arc::clone(&clock),
        ));
        let manager = CacheServiceManager::new(
            Arc::clone(&leaderboard),
            Arc::clone(&invalidation),
            monitor,
            config.monitoring.enabled,
        );

        let service = Arc::new(AsyncPointsService::start(
            repos.clone(),
            Arc::clone(&cache),
            Arc::clone(&bus),
            Arc::clone(&clock),
            ScoringServiceConfig::from(&config.scoring),
        ));
        let scoring = ScoringIntegration::new(
            Arc::clone(&bus),
            service,
            invalidation,
            leaderboard,
            config.leaderboard.refresh_on_points,
        );

        let hot_predictions = Arc::new(HotPredictionsService::new(
            Arc::clone(&repos.predictions),
            Arc::clone(&bus),
            Arc::clone(&clock),
            config.hot_predictions.clone(),
        ));
        let hot_subscriptions = hot_predictions.subscribe();

        let matches = MatchCacheService::new(Arc::clone(&cache), Arc::clone(&repos.matches), clock);

        info!(
            bus = ?config.event_bus.mode,
            workers = config.scoring.workers,
            queue_capacity = config.scoring.queue_capacity,
            remote = cache.remote().backend_name(),
            "Scoring pipeline built"
        );

        Self {
            config,
            supervisor: Supervisor::new(),
            cache,
            bus,
            manager,
            scoring,
            hot_predictions,
            hot_subscriptions,
            matches,
        }
    }

    /// Start the background loops and prewarm the leaderboards.
    pub async fn start(&self) {
        let memory = Arc::clone(self.cache.memory());
        self.supervisor.spawn_periodic(
            "memory-cache-sweep",
            self.config.cache.cleanup_interval(),
            move || {
                let memory = Arc::clone(&memory);
                async move {
                    memory.cleanup_expired();
                }
            },
        );
        self.hot_predictions.start_cleanup(self.supervisor.token());
        self.manager.start(self.supervisor.token()).await;
        info!("Scoring pipeline started");
    }

    /// Publish `match.finished` for a match whose result was just recorded.
    pub async fn report_match_finished(&self, m: &Match) -> Result<(), EventBusError> {
        let winner = m.winner.unwrap_or(if m.score_a >= m.score_b { Team::A } else { Team::B });
        let event = Event::match_finished(m.id, m.tournament, winner, m.score_a, m.score_b);
        events::publish(self.bus.as_ref(), event).await
    }

    /// Stop in dependency order: scoring and the bus drain first so their
    /// invalidations land, then the cache services, then the loops.
    pub async fn shutdown(&self) {
        let timeout = self.config.scoring.shutdown_timeout();
        info!(timeout_secs = timeout.as_secs(), "Shutting down scoring pipeline");

        self.scoring.shutdown(timeout).await;
        for id in &self.hot_subscriptions {
            self.bus.unsubscribe(*id);
        }
        self.hot_predictions.stop_cleanup().await;
        self.manager.stop().await;
        self.supervisor.shutdown(SUPERVISOR_SHUTDOWN_TIMEOUT).await;
        info!("Scoring pipeline stopped");
    }

    /// Current monitoring report, serialized for logs and dashboards.
    pub fn cache_report_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.manager.monitor().detailed_report())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<LayeredCache> {
        &self.cache
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn cache_manager(&self) -> &CacheServiceManager {
        &self.manager
    }

    pub fn leaderboard(&self) -> &Arc<LeaderboardCacheService> {
        self.manager.leaderboard()
    }

    pub fn invalidation(&self) -> &Arc<InvalidationService> {
        self.manager.invalidation()
    }

    pub fn monitor(&self) -> &Arc<CacheMonitor> {
        self.manager.monitor()
    }

    pub fn scoring(&self) -> &ScoringIntegration {
        &self.scoring
    }

    pub fn points_service(&self) -> &Arc<AsyncPointsService> {
        self.scoring.service()
    }

    pub fn hot_predictions(&self) -> &Arc<HotPredictionsService> {
        &self.hot_predictions
    }

    pub fn matches(&self) -> &MatchCacheService {
        &self.matches
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("cache", &self.cache)
            .field("scoring", &self.scoring)
            .field("supervised_tasks", &self.supervisor.task_count())
            .finish_non_exhaustive()
    }
}
