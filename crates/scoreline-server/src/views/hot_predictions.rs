//! Most-voted predictions per match.
//!
//! Kept in process: each match's predictions are cached sorted by votes
//! (descending, ties by submission time) and refreshed when a vote event
//! arrives.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scoreline_core::events::{
    Event, EventHandler, EventPayload, EventType, HandlerError, HotPredictionsUpdatedPayload,
    SharedEventBus, SubscriptionId,
};
use scoreline_core::{MatchId, PredictionWithVotes, SharedClock};
use scoreline_storage::{PredictionRepository, StorageError};

use crate::config::HotPredictionsConfig;
use crate::events;
use crate::supervisor::PeriodicTask;

#[derive(Debug, Clone)]
struct CachedPredictions {
    predictions: Arc<Vec<PredictionWithVotes>>,
    expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteStatistics {
    pub total_predictions: usize,
    pub total_votes: u64,
    pub featured_count: usize,
    pub max_votes: u32,
    pub min_votes: u32,
    pub average_votes: f64,
    /// Percentage of predictions with at least one vote.
    pub activity_rate: f64,
    pub vote_distribution: BTreeMap<&'static str, usize>,
    pub winner_distribution: BTreeMap<String, usize>,
    pub active_predictions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotCacheStats {
    pub total_cached_matches: usize,
    pub valid_caches: usize,
    pub expired_caches: usize,
    pub cache_timeout_secs: u64,
}

pub struct HotPredictionsService {
    predictions: Arc<dyn PredictionRepository>,
    bus: SharedEventBus,
    clock: SharedClock,
    config: HotPredictionsConfig,
    cache: DashMap<MatchId, CachedPredictions>,
    cleanup: Mutex<Option<PeriodicTask>>,
}

impl HotPredictionsService {
    pub fn new(
        predictions: Arc<dyn PredictionRepository>,
        bus: SharedEventBus,
        clock: SharedClock,
        config: HotPredictionsConfig,
    ) -> Self {
        Self {
            predictions,
            bus,
            clock,
            config,
            cache: DashMap::new(),
            cleanup: Mutex::new(None),
        }
    }

    /// Subscribe to vote events on the service's bus.
    pub fn subscribe(self: &Arc<Self>) -> Vec<SubscriptionId> {
        let handler = Arc::new(VoteEventHandler {
            service: Arc::clone(self),
        });
        let ids = vec![
            self.bus.subscribe(EventType::PredictionVoted, handler.clone()),
            self.bus.subscribe(EventType::PredictionUnvoted, handler),
        ];
        info!("Hot predictions subscribed to vote events");
        ids
    }

    fn ttl(&self) -> time::Duration {
        time::Duration::seconds(self.config.cache_ttl_secs as i64)
    }

    /// Top `limit` predictions of a match, or all of them when `limit` is 0.
    pub async fn get_hot_predictions(
        &self,
        match_id: MatchId,
        limit: usize,
    ) -> Result<Vec<PredictionWithVotes>, StorageError> {
        let now = self.clock.now();
        let cached = self
            .cache
            .get(&match_id)
            .filter(|c| now < c.expires_at)
            .map(|c| Arc::clone(&c.predictions));

        let sorted = match cached {
            Some(sorted) => sorted,
            None => self.refresh(match_id).await?,
        };
        Ok(take(&sorted, limit))
    }

    async fn refresh(&self, match_id: MatchId) -> Result<Arc<Vec<PredictionWithVotes>>, StorageError> {
        let mut predictions = self.predictions.predictions_by_match(match_id).await?;
        sort_by_votes(&mut predictions);
        let sorted = Arc::new(predictions);
        self.cache.insert(
            match_id,
            CachedPredictions {
                predictions: Arc::clone(&sorted),
                expires_at: self.clock.now() + self.ttl(),
            },
        );
        Ok(sorted)
    }

    /// Reload a match and announce its new ranking.
    pub async fn update_hot_predictions(&self, match_id: MatchId) -> Result<(), StorageError> {
        let sorted = self.refresh(match_id).await?;
        let event = Event::new(EventPayload::HotPredictionsUpdated(HotPredictionsUpdatedPayload {
            match_id,
            hot_predictions: take(&sorted, self.config.publish_top),
            total_count: sorted.len(),
        }))
        .at(self.clock.now());
        let _ = events::publish(self.bus.as_ref(), event).await;
        debug!(match_id, total = sorted.len(), "Hot predictions updated");
        Ok(())
    }

    pub async fn get_vote_statistics(&self, match_id: MatchId) -> Result<VoteStatistics, StorageError> {
        let predictions = self.predictions.predictions_by_match(match_id).await?;
        Ok(vote_statistics(&predictions))
    }

    pub fn clear_cache(&self, match_id: MatchId) {
        self.cache.remove(&match_id);
        debug!(match_id, "Cleared hot predictions cache");
    }

    pub fn clear_all_cache(&self) {
        self.cache.clear();
        info!("Cleared all hot predictions cache");
    }

    pub fn cache_stats(&self) -> HotCacheStats {
        let now = self.clock.now();
        let total = self.cache.len();
        let valid = self.cache.iter().filter(|c| now < c.expires_at).count();
        HotCacheStats {
            total_cached_matches: total,
            valid_caches: valid,
            expired_caches: total - valid,
            cache_timeout_secs: self.config.cache_ttl_secs,
        }
    }

    /// Drop expired matches. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.cache.len();
        self.cache.retain(|_, c| now < c.expires_at);
        let removed = before.saturating_sub(self.cache.len());
        if removed > 0 {
            debug!(removed, "Cleaned up expired hot predictions");
        }
        removed
    }

    pub fn start_cleanup(self: &Arc<Self>, parent: &CancellationToken) -> bool {
        let mut slot = self.cleanup.lock();
        if slot.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }
        let service = Arc::clone(self);
        *slot = Some(PeriodicTask::spawn(
            "hot-predictions-cleanup",
            parent,
            Duration::from_secs(self.config.cleanup_interval_secs),
            move || {
                let service = Arc::clone(&service);
                async move {
                    service.cleanup_expired();
                }
            },
        ));
        true
    }

    pub async fn stop_cleanup(&self) {
        let task = self.cleanup.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
    }
}

impl std::fmt::Debug for HotPredictionsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotPredictionsService")
            .field("config", &self.config)
            .field("cached_matches", &self.cache.len())
            .finish_non_exhaustive()
    }
}

struct VoteEventHandler {
    service: Arc<HotPredictionsService>,
}

#[async_trait]
impl EventHandler for VoteEventHandler {
    fn name(&self) -> &str {
        "hot_predictions"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let (EventPayload::PredictionVoted(payload) | EventPayload::PredictionUnvoted(payload)) =
            &event.payload
        else {
            return Err(HandlerError::unexpected_payload(self.name()));
        };

        // refresh off the dispatch path
        let service = Arc::clone(&self.service);
        let match_id = payload.match_id;
        tokio::spawn(async move {
            if let Err(e) = service.update_hot_predictions(match_id).await {
                warn!(match_id, error = %e, "Failed to refresh hot predictions");
            }
        });
        Ok(())
    }
}

fn sort_by_votes(predictions: &mut [PredictionWithVotes]) {
    predictions.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then(a.prediction.created_at.cmp(&b.prediction.created_at))
    });
}

fn take(sorted: &[PredictionWithVotes], limit: usize) -> Vec<PredictionWithVotes> {
    let n = if limit == 0 { sorted.len() } else { limit.min(sorted.len()) };
    sorted[..n].to_vec()
}

fn vote_range(votes: u32) -> &'static str {
    match votes {
        0 => "0",
        1..=2 => "1-2",
        3..=5 => "3-5",
        6..=10 => "6-10",
        11..=20 => "11-20",
        21..=50 => "21-50",
        _ => "50+",
    }
}

fn vote_statistics(predictions: &[PredictionWithVotes]) -> VoteStatistics {
    let total = predictions.len();
    let mut stats = VoteStatistics {
        total_predictions: total,
        total_votes: 0,
        featured_count: 0,
        max_votes: 0,
        min_votes: predictions.iter().map(|p| p.vote_count).min().unwrap_or(0),
        average_votes: 0.0,
        activity_rate: 0.0,
        vote_distribution: BTreeMap::new(),
        winner_distribution: BTreeMap::new(),
        active_predictions: 0,
    };

    for p in predictions {
        stats.total_votes += u64::from(p.vote_count);
        stats.max_votes = stats.max_votes.max(p.vote_count);
        if p.prediction.is_featured || p.is_featured_by_votes() {
            stats.featured_count += 1;
        }
        if p.vote_count > 0 {
            stats.active_predictions += 1;
        }
        *stats.vote_distribution.entry(vote_range(p.vote_count)).or_default() += 1;
        *stats
            .winner_distribution
            .entry(p.prediction.predicted_winner.to_string())
            .or_default() += 1;
    }

    if total > 0 {
        stats.average_votes = stats.total_votes as f64 / total as f64;
        stats.activity_rate = stats.active_predictions as f64 / total as f64 * 100.0;
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreline_core::events::{EventBus, FnHandler, InMemoryEventBus};
    use scoreline_core::{ManualClock, Prediction, Team};
    use scoreline_db_memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;

    fn store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new_shared();
        let base = datetime!(2024-03-01 10:00 UTC);
        store.insert_prediction(Prediction::new(1, 1, 9, Team::A, 1, 0, base), 3);
        store.insert_prediction(Prediction::new(2, 2, 9, Team::B, 0, 1, base + time::Duration::hours(1)), 12);
        store.insert_prediction(Prediction::new(3, 3, 9, Team::A, 2, 0, base - time::Duration::hours(1)), 3);
        store.insert_prediction(Prediction::new(4, 4, 9, Team::A, 2, 2, base), 0);
        store
    }

    fn service(store: &Arc<InMemoryStore>, bus: SharedEventBus) -> (Arc<HotPredictionsService>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(datetime!(2024-03-02 10:00 UTC)));
        let svc = Arc::new(HotPredictionsService::new(
            store.repositories().predictions,
            bus,
            clock.clone(),
            HotPredictionsConfig::default(),
        ));
        (svc, clock)
    }

    #[tokio::test]
    async fn test_sorted_by_votes_then_age() {
        let store = store();
        let (svc, _) = service(&store, Arc::new(InMemoryEventBus::new()));
        let hot = svc.get_hot_predictions(9, 3).await.unwrap();
        let ids: Vec<u64> = hot.iter().map(|p| p.prediction.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_cache_expires_with_clock() {
        let store = store();
        let (svc, clock) = service(&store, Arc::new(InMemoryEventBus::new()));
        svc.get_hot_predictions(9, 0).await.unwrap();

        store.vote(4, 50).unwrap();
        let cached = svc.get_hot_predictions(9, 1).await.unwrap();
        assert_eq!(cached[0].prediction.id, 2);

        clock.advance(time::Duration::minutes(6));
        assert_eq!(svc.cache_stats().expired_caches, 1);
        let fresh = svc.get_hot_predictions(9, 1).await.unwrap();
        assert_eq!(fresh[0].prediction.id, 4);

        clock.advance(time::Duration::minutes(6));
        assert_eq!(svc.cleanup_expired(), 1);
        assert_eq!(svc.cache_stats().total_cached_matches, 0);
    }

    #[tokio::test]
    async fn test_vote_event_publishes_update() {
        let store = store();
        let bus: SharedEventBus = Arc::new(InMemoryEventBus::new());
        let published = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&published);
        bus.subscribe(
            EventType::HotPredictionsUpdated,
            Arc::new(FnHandler::new("hot-observer", move |event: Event| {
                let counter = Arc::clone(&counter);
                async move {
                    if let EventPayload::HotPredictionsUpdated(p) = event.payload {
                        assert_eq!(p.total_count, 4);
                        assert_eq!(p.hot_predictions[0].prediction.id, 2);
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                }
            })),
        );
        let (svc, _) = service(&store, Arc::clone(&bus));
        svc.subscribe();

        bus.publish(Event::prediction_voted(2, 9, 7, 12)).await.unwrap();
        for _ in 0..100 {
            if published.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_vote_statistics() {
        let store = store();
        let (svc, _) = service(&store, Arc::new(InMemoryEventBus::new()));
        let stats = svc.get_vote_statistics(9).await.unwrap();

        assert_eq!(stats.total_predictions, 4);
        assert_eq!(stats.total_votes, 18);
        assert_eq!(stats.featured_count, 1);
        assert_eq!((stats.min_votes, stats.max_votes), (0, 12));
        assert_eq!(stats.active_predictions, 3);
        assert_eq!(stats.activity_rate, 75.0);
        assert_eq!(stats.vote_distribution["3-5"], 2);
        assert_eq!(stats.vote_distribution["11-20"], 1);
        assert_eq!(stats.winner_distribution["A"], 3);
    }

    #[test]
    fn test_empty_statistics() {
        let stats = vote_statistics(&[]);
        assert_eq!(stats.total_predictions, 0);
        assert_eq!(stats.average_votes, 0.0);
        assert!(stats.vote_distribution.is_empty());
    }
}
