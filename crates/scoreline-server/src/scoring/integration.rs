//! Event-driven wiring of the scoring service.
//!
//! - `match.finished` → [`MatchFinishHandler`] queues a scoring pass
//! - `points.calculated` → [`LeaderboardUpdateHandler`] invalidates and
//!   optionally refreshes the affected leaderboards
//! - `points.calculated` → [`PointsNotificationHandler`] reports awarded points

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use scoreline_core::events::{
    Event, EventHandler, EventPayload, EventType, HandlerError, SharedEventBus, SubscriptionId,
};
use scoreline_core::{MatchId, RuleId, Tournament};

use super::error::ScoringResult;
use super::service::{AsyncPointsService, QueueStatus, ScoringTask};
use crate::leaderboard::{InvalidationService, LeaderboardCacheService};

// ============================================================================
// Handlers
// ============================================================================

pub struct MatchFinishHandler {
    service: Arc<AsyncPointsService>,
}

impl MatchFinishHandler {
    pub fn new(service: Arc<AsyncPointsService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for MatchFinishHandler {
    fn name(&self) -> &str {
        "match_finish"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let EventPayload::MatchFinished(payload) = &event.payload else {
            return Err(HandlerError::unexpected_payload(self.name()));
        };

        let task_id = self
            .service
            .queue_points_calculation(payload.match_id, None)
            .map_err(|e| HandlerError::execution(format!("failed to queue points calculation: {e}")))?;

        info!(
            match_id = payload.match_id,
            winner = %payload.winner,
            score_a = payload.score_a,
            score_b = payload.score_b,
            task_id = %task_id,
            "Points calculation queued for finished match"
        );
        Ok(())
    }
}

pub struct LeaderboardUpdateHandler {
    invalidation: Arc<InvalidationService>,
    leaderboard: Arc<LeaderboardCacheService>,
    refresh_on_points: bool,
}

impl LeaderboardUpdateHandler {
    pub fn new(
        invalidation: Arc<InvalidationService>,
        leaderboard: Arc<LeaderboardCacheService>,
        refresh_on_points: bool,
    ) -> Self {
        Self {
            invalidation,
            leaderboard,
            refresh_on_points,
        }
    }
}

#[async_trait]
impl EventHandler for LeaderboardUpdateHandler {
    fn name(&self) -> &str {
        "leaderboard_update"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let EventPayload::PointsCalculated(payload) = &event.payload else {
            return Err(HandlerError::unexpected_payload(self.name()));
        };

        self.invalidation
            .invalidate_on_match_complete(payload.match_id, payload.tournament)
            .await
            .map_err(|e| HandlerError::cache(e.to_string()))?;

        if self.refresh_on_points {
            let mut targets = vec![payload.tournament];
            if !payload.tournament.is_global() {
                targets.push(Tournament::Global);
            }
            for tournament in targets {
                let leaderboard = Arc::clone(&self.leaderboard);
                tokio::spawn(async move {
                    match leaderboard.refresh_cache(tournament).await {
                        Ok(()) => debug!(tournament = %tournament, "Leaderboard refreshed after scoring"),
                        Err(e) => warn!(tournament = %tournament, error = %e, "Leaderboard refresh after scoring failed"),
                    }
                });
            }
        }
        Ok(())
    }
}

/// Reports every user that earned points. Delivery channels (mail, push)
/// hang off this handler.
#[derive(Debug, Default)]
pub struct PointsNotificationHandler {
    notified: AtomicU64,
}

impl PointsNotificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users notified since startup.
    pub fn notified_count(&self) -> u64 {
        self.notified.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventHandler for PointsNotificationHandler {
    fn name(&self) -> &str {
        "points_notification"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let EventPayload::PointsCalculated(payload) = &event.payload else {
            return Err(HandlerError::unexpected_payload(self.name()));
        };

        let mut earned = 0u64;
        for p in payload.predictions.iter().filter(|p| p.points > 0) {
            debug!(
                user_id = p.user_id,
                prediction_id = p.prediction_id,
                points = p.points,
                is_correct = p.is_correct,
                "User earned points"
            );
            earned += 1;
        }
        self.notified.fetch_add(earned, Ordering::Relaxed);
        info!(
            match_id = payload.match_id,
            predictions = payload.predictions.len(),
            earned,
            "Points notifications processed"
        );
        Ok(())
    }
}

// ============================================================================
// Integration
// ============================================================================

/// Scoring service plus its event subscriptions.
pub struct ScoringIntegration {
    bus: SharedEventBus,
    service: Arc<AsyncPointsService>,
    notifications: Arc<PointsNotificationHandler>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl ScoringIntegration {
    /// Subscribe the scoring handlers to `bus`.
    pub fn new(
        bus: SharedEventBus,
        service: Arc<AsyncPointsService>,
        invalidation: Arc<InvalidationService>,
        leaderboard: Arc<LeaderboardCacheService>,
        refresh_on_points: bool,
    ) -> Self {
        let notifications = Arc::new(PointsNotificationHandler::new());
        let subscriptions = vec![
            bus.subscribe(
                EventType::MatchFinished,
                Arc::new(MatchFinishHandler::new(Arc::clone(&service))),
            ),
            bus.subscribe(
                EventType::PointsCalculated,
                Arc::new(LeaderboardUpdateHandler::new(
                    invalidation,
                    leaderboard,
                    refresh_on_points,
                )),
            ),
            bus.subscribe(EventType::PointsCalculated, notifications.clone()),
        ];
        info!("Scoring integration initialized");

        Self {
            bus,
            service,
            notifications,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn service(&self) -> &Arc<AsyncPointsService> {
        &self.service
    }

    pub fn notifications(&self) -> &Arc<PointsNotificationHandler> {
        &self.notifications
    }

    /// Queue a scoring pass outside the event flow, e.g. after a rule change.
    pub fn manual_trigger(&self, match_id: MatchId, rule_id: Option<RuleId>) -> ScoringResult<String> {
        self.service.queue_points_calculation(match_id, rule_id)
    }

    pub fn calculation_status(&self, task_id: &str) -> ScoringResult<ScoringTask> {
        self.service.get_task_status(task_id)
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.service.queue_status()
    }

    /// Drain the scoring service, drop the subscriptions, then drain the bus.
    /// Each stage gets `timeout`.
    pub async fn shutdown(&self, timeout: Duration) {
        self.service.shutdown(timeout).await;
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for id in subscriptions {
            self.bus.unsubscribe(id);
        }
        self.bus.close(timeout).await;
        info!("Scoring integration shut down");
    }
}

impl std::fmt::Debug for ScoringIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringIntegration")
            .field("service", &self.service)
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryRemoteCache, LayeredCache, MemoryCache, keys};
    use crate::leaderboard::LeaderboardCacheConfig;
    use crate::scoring::service::{ScoringServiceConfig, TaskStatus};
    use scoreline_core::events::{EventBus, InMemoryEventBus};
    use scoreline_core::{Match, Prediction, Team, User, system_clock};
    use scoreline_db_memory::InMemoryStore;
    use time::macros::datetime;

    struct Fixture {
        integration: ScoringIntegration,
        store: Arc<InMemoryStore>,
        cache: Arc<LayeredCache>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new_shared();
        let mut m = Match::scheduled(5, "Lions", "Tigers", Tournament::Winter, datetime!(2024-12-01 18:00 UTC));
        m.finish(Team::B, 0, 2);
        store.insert_match(m);
        store.insert_user(User::new(1, "alice"));
        store.insert_prediction(
            Prediction::new(50, 1, 5, Team::B, 0, 2, datetime!(2024-11-30 12:00 UTC)),
            0,
        );

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
        let bus: SharedEventBus = Arc::new(InMemoryEventBus::new());
        let service = Arc::new(AsyncPointsService::start(
            store.repositories(),
            Arc::clone(&cache),
            Arc::clone(&bus),
            system_clock(),
            ScoringServiceConfig::default(),
        ));
        let integration = ScoringIntegration::new(bus, service, invalidation, leaderboard, false);
        Fixture {
            integration,
            store,
            cache,
        }
    }

    async fn wait_for_notifications(integration: &ScoringIntegration, expected: u64) {
        for _ in 0..200 {
            if integration.notifications().notified_count() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("notifications did not arrive");
    }

    #[tokio::test]
    async fn test_match_finished_event_drives_scoring() {
        let f = fixture();
        f.cache
            .set(&keys::leaderboard(Tournament::Winter), b"stale".to_vec(), Duration::from_secs(300))
            .await
            .unwrap();

        f.integration
            .bus()
            .publish(Event::match_finished(5, Tournament::Winter, Team::B, 0, 2))
            .await
            .unwrap();

        wait_for_notifications(&f.integration, 1).await;
        // legacy table: perfect prediction
        assert_eq!(f.store.user(1).unwrap().points, 30);
        assert!(!f.cache.exists("leaderboard:WINTER").await.unwrap());
    }

    #[tokio::test]
    async fn test_manual_trigger_and_status() {
        let f = fixture();
        let id = f.integration.manual_trigger(5, None).unwrap();
        let mut status = f.integration.calculation_status(&id).unwrap().status;
        for _ in 0..200 {
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            status = f.integration.calculation_status(&id).unwrap().status;
        }
        assert_eq!(status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_unsubscribes_handlers() {
        let f = fixture();
        assert_eq!(f.integration.bus().handler_count(EventType::PointsCalculated), 2);

        f.integration.shutdown(Duration::from_secs(1)).await;
        assert_eq!(f.integration.bus().handler_count(EventType::PointsCalculated), 0);
        assert_eq!(f.integration.bus().handler_count(EventType::MatchFinished), 0);
        assert!(f.integration.manual_trigger(5, None).is_err());
    }

    #[tokio::test]
    async fn test_handlers_reject_foreign_payloads() {
        let handler = PointsNotificationHandler::new();
        let event = Event::match_finished(1, Tournament::Spring, Team::A, 1, 0);
        assert!(handler.handle(&event).await.is_err());
    }
}
