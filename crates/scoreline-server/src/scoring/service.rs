//! Asynchronous points calculation.
//!
//! ```text
//! queue_points_calculation ──try_send──► [ bounded queue ] ──► worker 1..W
//!        │ full                                                    │
//!        └──► ScoringError::QueueFull                              ▼
//!                         load match → rule → predictions → score each
//!                         → persist → upsert calculation → user deltas
//!                         → invalidate caches → publish PointsCalculated
//! ```
//!
//! Tasks are identified by `points_{match_id}_{unix_nanos}`. Terminal tasks
//! move from the active table into a bounded history so their outcome stays
//! observable through [`AsyncPointsService::get_task_status`].

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scoreline_core::events::{Event, PredictionPoints, SharedEventBus};
use scoreline_core::scoring::{calculate, points_reason};
use scoreline_core::{
    MatchId, MatchPointsCalculation, PointsCalculationResult, PopularityBonus, PredictionAccuracy,
    RuleId, SharedClock, Tournament, UserId,
};
use scoreline_storage::Repositories;

use super::error::{ScoringError, ScoringResult};
use crate::cache::{LayeredCache, keys};
use crate::config::ScoringConfig;
use crate::events;
use crate::metrics;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_HISTORY_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct ScoringServiceConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    pub history_size: usize,
}

impl Default for ScoringServiceConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl From<&ScoringConfig> for ScoringServiceConfig {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            workers: config.workers,
            history_size: config.history_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringTask {
    pub id: String,
    pub match_id: MatchId,
    pub rule_id: Option<RuleId>,
    pub status: TaskStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub capacity: usize,
    pub active_tasks: usize,
    pub workers: usize,
}

#[derive(Debug)]
struct TaskTable {
    active: HashMap<String, ScoringTask>,
    history: VecDeque<ScoringTask>,
    history_size: usize,
    last_nanos: i128,
}

impl TaskTable {
    fn next_id(&mut self, match_id: MatchId, now: OffsetDateTime) -> String {
        // strictly increasing even when the clock stands still
        let nanos = now.unix_timestamp_nanos().max(self.last_nanos + 1);
        self.last_nanos = nanos;
        format!("points_{match_id}_{nanos}")
    }

    fn retire(&mut self, id: &str) {
        if let Some(task) = self.active.remove(id) {
            self.history.push_back(task);
            while self.history.len() > self.history_size {
                self.history.pop_front();
            }
        }
    }

    fn get(&self, id: &str) -> Option<ScoringTask> {
        self.active
            .get(id)
            .or_else(|| self.history.iter().rev().find(|t| t.id == id))
            .cloned()
    }
}

struct Inner {
    repos: Repositories,
    cache: Arc<LayeredCache>,
    bus: SharedEventBus,
    clock: SharedClock,
    tasks: Mutex<TaskTable>,
}

/// Bounded worker pool scoring finished matches.
pub struct AsyncPointsService {
    inner: Arc<Inner>,
    sender: Mutex<Option<mpsc::Sender<String>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    token: CancellationToken,
    config: ScoringServiceConfig,
}

impl AsyncPointsService {
    /// Create the service and spawn its workers. Must be called inside a
    /// tokio runtime.
    pub fn start(
        repos: Repositories,
        cache: Arc<LayeredCache>,
        bus: SharedEventBus,
        clock: SharedClock,
        config: ScoringServiceConfig,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let worker_count = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let token = CancellationToken::new();

        let inner = Arc::new(Inner {
            repos,
            cache,
            bus,
            clock,
            tasks: Mutex::new(TaskTable {
                active: HashMap::new(),
                history: VecDeque::with_capacity(config.history_size),
                history_size: config.history_size,
                last_nanos: 0,
            }),
        });

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&inner),
                    Arc::clone(&receiver),
                    token.clone(),
                ))
            })
            .collect();

        info!(workers = worker_count, capacity, "Points calculation service started");
        Self {
            inner,
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(workers),
            token,
            config: ScoringServiceConfig {
                queue_capacity: capacity,
                workers: worker_count,
                history_size: config.history_size,
            },
        }
    }

    /// Enqueue a scoring pass for `match_id`. Never waits for a worker: a
    /// full queue is reported immediately.
    pub fn queue_points_calculation(
        &self,
        match_id: MatchId,
        rule_id: Option<RuleId>,
    ) -> ScoringResult<String> {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            metrics::record_scoring_task("rejected");
            return Err(ScoringError::ShuttingDown);
        };

        let now = self.inner.clock.now();
        let task_id = {
            let mut tasks = self.inner.tasks.lock();
            let id = tasks.next_id(match_id, now);
            tasks.active.insert(
                id.clone(),
                ScoringTask {
                    id: id.clone(),
                    match_id,
                    rule_id,
                    status: TaskStatus::Pending,
                    created_at: now,
                    started_at: None,
                    completed_at: None,
                    error: None,
                },
            );
            id
        };

        if let Err(e) = sender.try_send(task_id.clone()) {
            self.inner.tasks.lock().active.remove(&task_id);
            metrics::record_scoring_task("rejected");
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(match_id, capacity = self.config.queue_capacity, "Points calculation queue full");
                    ScoringError::QueueFull {
                        capacity: self.config.queue_capacity,
                    }
                }
                mpsc::error::TrySendError::Closed(_) => ScoringError::ShuttingDown,
            });
        }

        metrics::record_scoring_task("queued");
        metrics::set_scoring_queue_depth(queue_length(&sender));
        info!(task_id = %task_id, match_id, ?rule_id, "Queued points calculation");
        Ok(task_id)
    }

    pub fn get_task_status(&self, task_id: &str) -> ScoringResult<ScoringTask> {
        self.inner
            .tasks
            .lock()
            .get(task_id)
            .ok_or_else(|| ScoringError::TaskNotFound(task_id.to_string()))
    }

    pub fn queue_status(&self) -> QueueStatus {
        let queue_length = self.sender.lock().as_ref().map_or(0, queue_length);
        QueueStatus {
            queue_length,
            capacity: self.config.queue_capacity,
            active_tasks: self.inner.tasks.lock().active.len(),
            workers: self.config.workers,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop intake, let in-flight passes finish within `timeout`, and mark
    /// every task that did not run to completion as failed. Idempotent.
    pub async fn shutdown(&self, timeout: Duration) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);
        self.token.cancel();
        info!("Shutting down points calculation service");

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        let deadline = Instant::now() + timeout;
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("Scoring worker did not stop before timeout, aborting");
                handle.abort();
            }
        }

        // whatever is still queued never started
        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut abandoned = 0usize;
        while let Ok(task_id) = receiver.try_recv() {
            self.inner.fail(&task_id, "service shut down before the task started");
            abandoned += 1;
        }
        drop(receiver);

        let interrupted: Vec<String> = self
            .inner
            .tasks
            .lock()
            .active
            .values()
            .filter(|t| t.status == TaskStatus::Processing)
            .map(|t| t.id.clone())
            .collect();
        for task_id in &interrupted {
            self.inner.fail(task_id, "interrupted by shutdown");
        }

        metrics::set_scoring_queue_depth(0);
        info!(
            abandoned,
            interrupted = interrupted.len(),
            "Points calculation service stopped"
        );
    }
}

impl std::fmt::Debug for AsyncPointsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPointsService")
            .field("config", &self.config)
            .field("status", &self.queue_status())
            .finish()
    }
}

fn queue_length(sender: &mpsc::Sender<String>) -> usize {
    sender.max_capacity() - sender.capacity()
}

async fn run_worker(
    worker_id: usize,
    inner: Arc<Inner>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
    token: CancellationToken,
) {
    debug!(worker_id, "Scoring worker started");
    loop {
        // cancellation is only observed between tasks
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = async { receiver.lock().await.recv().await } => next,
        };
        let Some(task_id) = next else { break };
        inner.run_task(worker_id, &task_id).await;
    }
    debug!(worker_id, "Scoring worker stopped");
}

impl Inner {
    async fn run_task(&self, worker_id: usize, task_id: &str) {
        let Some((match_id, rule_id)) = self.mark_processing(task_id) else {
            return;
        };
        let started = Instant::now();

        let outcome = AssertUnwindSafe(self.score_match(match_id, rule_id))
            .catch_unwind()
            .await;
        metrics::record_scoring_duration(started.elapsed());

        match outcome {
            Ok(Ok(calculation)) => {
                self.complete(task_id);
                metrics::record_scoring_task("completed");
                info!(
                    task_id,
                    worker_id,
                    match_id,
                    predictions = calculation.results.len(),
                    total_points = calculation.total_points,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Points calculation completed"
                );
            }
            Ok(Err(e)) => {
                error!(task_id, worker_id, match_id, error = %e, "Points calculation failed");
                self.fail(task_id, &e.to_string());
            }
            Err(_) => {
                error!(task_id, worker_id, match_id, "Points calculation panicked");
                self.fail(task_id, "points calculation panicked");
            }
        }
    }

    fn mark_processing(&self, task_id: &str) -> Option<(MatchId, Option<RuleId>)> {
        let now = self.clock.now();
        let mut tasks = self.tasks.lock();
        let task = tasks.active.get_mut(task_id)?;
        task.status = TaskStatus::Processing;
        task.started_at = Some(now);
        Some((task.match_id, task.rule_id))
    }

    fn complete(&self, task_id: &str) {
        let now = self.clock.now();
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.active.get_mut(task_id) {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(now);
        }
        tasks.retire(task_id);
    }

    fn fail(&self, task_id: &str, reason: &str) {
        let now = self.clock.now();
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.active.get_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(now);
            task.error = Some(reason.to_string());
        }
        tasks.retire(task_id);
        metrics::record_scoring_task("failed");
    }

    /// One full scoring pass. Writes already made are kept when a later step
    /// fails; rerunning the pass converges to the same state.
    async fn score_match(
        &self,
        match_id: MatchId,
        rule_id: Option<RuleId>,
    ) -> ScoringResult<MatchPointsCalculation> {
        let m = self
            .repos
            .matches
            .get_by_id(match_id)
            .await
            .map_err(|e| ScoringError::for_match(match_id, e))?;
        if !m.is_finished() {
            return Err(ScoringError::MatchNotFinished(match_id));
        }

        let rule = match rule_id {
            Some(id) => Some(self.repos.rules.rule_by_id(id).await),
            None => self.repos.rules.active_rule().await.transpose(),
        }
        .transpose()
        .map_err(|e| ScoringError::for_match(match_id, e))?;

        let predictions = self
            .repos
            .predictions
            .predictions_by_match(match_id)
            .await
            .map_err(|e| ScoringError::for_match(match_id, e))?;

        let mut calculation =
            MatchPointsCalculation::new(match_id, rule.as_ref().map(|r| r.id), self.clock.now());
        let mut earned: BTreeMap<UserId, i64> = BTreeMap::new();
        let mut published = Vec::with_capacity(predictions.len());

        for p in &predictions {
            let breakdown = calculate(p, &m, rule.as_ref());
            let is_correct = p.prediction.is_correct_for(&m);
            let bonus = if is_correct {
                PopularityBonus::for_votes(p.vote_count)
            } else {
                PopularityBonus::none(p.vote_count)
            };
            let points = breakdown.total_score.saturating_add(bonus.bonus);
            let accuracy = PredictionAccuracy::classify(&p.prediction, &m);
            let prediction_id = p.prediction.id;
            let user_id = p.prediction.user_id;

            self.repos
                .predictions
                .update_prediction_points(prediction_id, points, is_correct)
                .await
                .map_err(|e| ScoringError::for_prediction(match_id, prediction_id, e))?;

            let total = earned.entry(user_id).or_default();
            *total = total.saturating_add(points);

            debug!(
                match_id,
                prediction_id,
                user_id,
                points,
                breakdown = %breakdown.description(),
                "Scored prediction"
            );
            calculation.push(PointsCalculationResult {
                prediction_id,
                user_id,
                match_id,
                points,
                is_correct,
                reason: points_reason(accuracy, breakdown.total_score, bonus),
            });
            published.push(PredictionPoints {
                prediction_id,
                user_id,
                points,
                is_correct,
            });
        }

        self.repos
            .calculations
            .upsert(&calculation)
            .await
            .map_err(|e| ScoringError::for_match(match_id, e))?;

        let settled = self
            .repos
            .calculations
            .settled_points(match_id)
            .await
            .map_err(|e| ScoringError::for_match(match_id, e))?;
        let users = self.settle_users(match_id, &earned, &settled).await;
        self.invalidate_caches(users.into_iter()).await;

        let event = Event::points_calculated(match_id, m.tournament, published).at(self.clock.now());
        let _ = events::publish(self.bus.as_ref(), event).await;

        Ok(calculation)
    }

    /// Bring every user's total in line with what this pass awarded them,
    /// relative to what earlier passes actually settled. Best effort per
    /// user: a failed update is logged, left unsettled for the next pass,
    /// and the rest proceed. Returns every user touched by the match.
    async fn settle_users(
        &self,
        match_id: MatchId,
        earned: &BTreeMap<UserId, i64>,
        settled: &BTreeMap<UserId, i64>,
    ) -> BTreeSet<UserId> {
        let users: BTreeSet<UserId> = earned.keys().chain(settled.keys()).copied().collect();
        let mut failed = 0usize;
        for &user_id in &users {
            let target = earned.get(&user_id).copied().unwrap_or(0);
            let delta = target.saturating_sub(settled.get(&user_id).copied().unwrap_or(0));
            if delta == 0 {
                continue;
            }
            let result = async {
                let mut user = self.repos.users.get_by_id(user_id).await?;
                user.points = user.points.saturating_add(delta);
                self.repos.users.update(&user).await
            }
            .await;
            if let Err(e) = result {
                failed += 1;
                warn!(match_id, user_id, delta, error = %e, "Failed to apply points delta");
                continue;
            }
            match self
                .repos
                .calculations
                .record_settlement(match_id, user_id, target)
                .await
            {
                Ok(()) => debug!(match_id, user_id, delta, "Applied points delta"),
                Err(e) => {
                    failed += 1;
                    error!(
                        match_id,
                        user_id,
                        delta,
                        error = %e,
                        "Applied points delta but failed to record settlement"
                    );
                }
            }
        }
        if failed > 0 {
            warn!(match_id, failed, users = users.len(), "Some user totals were not updated");
        }
        users
    }

    async fn invalidate_caches(&self, users: impl Iterator<Item = UserId>) {
        for tournament in Tournament::ALL {
            if let Err(e) = self.cache.delete(&keys::leaderboard(tournament)).await {
                warn!(tournament = %tournament, error = %e, "Failed to invalidate leaderboard cache");
            }
        }
        for user_id in users {
            if let Err(e) = self.cache.delete(&keys::user(user_id)).await {
                warn!(user_id, error = %e, "Failed to invalidate user cache");
            }
        }
        metrics::record_invalidation("points");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryRemoteCache, MemoryCache};
    use async_trait::async_trait;
    use scoreline_core::events::{EventBus, EventType, FnHandler, InMemoryEventBus};
    use scoreline_core::{Match, Prediction, ScoringRule, Team, User, system_clock};
    use scoreline_db_memory::InMemoryStore;
    use scoreline_storage::{MatchListFilter, MatchRepository, StorageError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;
    use tokio::sync::Semaphore;

    /// Match lookups wait for a permit, keeping workers busy on demand.
    struct GatedMatches {
        inner: Arc<dyn MatchRepository>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl MatchRepository for GatedMatches {
        async fn get_by_id(&self, id: MatchId) -> Result<scoreline_core::Match, StorageError> {
            let _permit = self.gate.acquire().await;
            self.inner.get_by_id(id).await
        }

        async fn list(&self, filter: &MatchListFilter) -> Result<Vec<scoreline_core::Match>, StorageError> {
            self.inner.list(filter).await
        }
    }

    fn finished_match(id: MatchId) -> Match {
        let mut m = Match::scheduled(id, "Lions", "Tigers", Tournament::Spring, datetime!(2024-05-01 18:00 UTC));
        m.finish(Team::A, 2, 1);
        m
    }

    fn prediction(id: u64, user_id: UserId, match_id: MatchId, winner: Team, a: u32, b: u32) -> Prediction {
        Prediction::new(id, user_id, match_id, winner, a, b, datetime!(2024-04-30 12:00 UTC))
    }

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new_shared();
        store.insert_match(finished_match(1));
        store.insert_user(User::new(10, "alice"));
        store.insert_user(User::new(11, "bob"));
        store.insert_prediction(prediction(100, 10, 1, Team::A, 2, 1), 12);
        store.insert_prediction(prediction(101, 11, 1, Team::B, 0, 1), 0);
        store
    }

    fn rule() -> ScoringRule {
        ScoringRule {
            id: 1,
            name: "default".into(),
            is_active: true,
            base_points: 10,
            enable_vote_reward: true,
            vote_reward_points: 1,
            max_vote_reward: 10,
            ..ScoringRule::default()
        }
    }

    fn cache() -> Arc<LayeredCache> {
        Arc::new(LayeredCache::new(
            Arc::new(MemoryCache::default()),
            InMemoryRemoteCache::new_shared(),
        ))
    }

    fn service(repos: Repositories, bus: SharedEventBus, config: ScoringServiceConfig) -> AsyncPointsService {
        AsyncPointsService::start(repos, cache(), bus, system_clock(), config)
    }

    async fn wait_terminal(svc: &AsyncPointsService, id: &str) -> ScoringTask {
        for _ in 0..200 {
            let task = svc.get_task_status(id).unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} did not finish");
    }

    #[tokio::test]
    async fn test_scores_match_and_updates_users() {
        let store = seeded_store();
        store.insert_rule(rule()).unwrap();
        let bus: SharedEventBus = Arc::new(InMemoryEventBus::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        bus.subscribe(
            EventType::PointsCalculated,
            Arc::new(FnHandler::new("count", move |_event| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })),
        );

        let svc = service(store.repositories(), bus, ScoringServiceConfig::default());
        let id = svc.queue_points_calculation(1, None).unwrap();
        assert!(id.starts_with("points_1_"));

        let task = wait_terminal(&svc, &id).await;
        assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);

        // base 10 + vote 10 (capped) + popularity 5
        assert_eq!(store.prediction(100).unwrap().prediction.points, 25);
        assert_eq!(store.prediction(101).unwrap().prediction.points, 0);
        assert_eq!(store.user(10).unwrap().points, 25);
        assert_eq!(store.calculation(1).unwrap().total_points, 25);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let store = seeded_store();
        store.insert_rule(rule()).unwrap();
        let svc = service(store.repositories(), Arc::new(InMemoryEventBus::new()), ScoringServiceConfig::default());

        let first = svc.queue_points_calculation(1, None).unwrap();
        wait_terminal(&svc, &first).await;
        let second = svc.queue_points_calculation(1, None).unwrap();
        assert_ne!(first, second);
        wait_terminal(&svc, &second).await;

        assert_eq!(store.calculation(1).unwrap().total_points, 25);
        assert_eq!(store.user(10).unwrap().points, 25);
    }

    #[tokio::test]
    async fn test_unfinished_match_fails_task() {
        let store = InMemoryStore::new_shared();
        store.insert_match(Match::scheduled(2, "A", "B", Tournament::Summer, datetime!(2024-06-01 18:00 UTC)));
        let svc = service(store.repositories(), Arc::new(InMemoryEventBus::new()), ScoringServiceConfig::default());

        let id = svc.queue_points_calculation(2, None).unwrap();
        let task = wait_terminal(&svc, &id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("match 2 is not finished"));
    }

    #[tokio::test]
    async fn test_user_failure_does_not_abort_batch() {
        let store = seeded_store();
        store.insert_prediction(prediction(102, 11, 1, Team::A, 3, 0), 0);
        store.fail_updates_for_user(10);
        let svc = service(store.repositories(), Arc::new(InMemoryEventBus::new()), ScoringServiceConfig::default());

        let id = svc.queue_points_calculation(1, None).unwrap();
        let task = wait_terminal(&svc, &id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(store.user(10).unwrap().points, 0);
        // legacy table: right winner, wrong score
        assert_eq!(store.user(11).unwrap().points, 10);
    }

    #[tokio::test]
    async fn test_rerun_settles_users_that_failed_before() {
        let store = seeded_store();
        store.insert_rule(rule()).unwrap();
        store.fail_updates_for_user(10);
        let svc = service(store.repositories(), Arc::new(InMemoryEventBus::new()), ScoringServiceConfig::default());

        let first = svc.queue_points_calculation(1, None).unwrap();
        assert_eq!(wait_terminal(&svc, &first).await.status, TaskStatus::Completed);
        assert_eq!(store.prediction(100).unwrap().prediction.points, 25);
        assert_eq!(store.user(10).unwrap().points, 0);
        assert_eq!(store.settled(1, 10), None);

        store.restore_updates_for_user(10);
        let second = svc.queue_points_calculation(1, None).unwrap();
        wait_terminal(&svc, &second).await;
        assert_eq!(store.user(10).unwrap().points, 25);
        assert_eq!(store.settled(1, 10), Some(25));

        // a third pass has nothing left to settle
        let third = svc.queue_points_calculation(1, None).unwrap();
        wait_terminal(&svc, &third).await;
        assert_eq!(store.user(10).unwrap().points, 25);
    }

    #[tokio::test]
    async fn test_rerun_settles_user_missing_on_first_pass() {
        let store = InMemoryStore::new_shared();
        store.insert_match(finished_match(1));
        store.insert_prediction(prediction(100, 10, 1, Team::A, 2, 1), 12);
        store.insert_rule(rule()).unwrap();
        let svc = service(store.repositories(), Arc::new(InMemoryEventBus::new()), ScoringServiceConfig::default());

        let first = svc.queue_points_calculation(1, None).unwrap();
        wait_terminal(&svc, &first).await;
        assert_eq!(store.calculation(1).unwrap().total_points, 25);

        store.insert_user(User::new(10, "alice"));
        let second = svc.queue_points_calculation(1, None).unwrap();
        wait_terminal(&svc, &second).await;
        assert_eq!(store.user(10).unwrap().points, 25);
    }

    #[tokio::test]
    async fn test_popularity_bonus_needs_correct_prediction() {
        let store = seeded_store();
        // wrong winner, heavily voted
        store.insert_prediction(prediction(102, 11, 1, Team::B, 1, 2), 25);
        let svc = service(store.repositories(), Arc::new(InMemoryEventBus::new()), ScoringServiceConfig::default());

        let id = svc.queue_points_calculation(1, None).unwrap();
        wait_terminal(&svc, &id).await;

        let scored = store.prediction(102).unwrap().prediction;
        assert_eq!(scored.points, 0);
        assert!(!scored.is_correct);
        assert_eq!(store.user(11).unwrap().points, 0);
        let result = store
            .calculation(1)
            .unwrap()
            .results
            .into_iter()
            .find(|r| r.prediction_id == 102)
            .unwrap();
        assert_eq!(result.reason, "wrong prediction");
        // legacy perfect 30 + popularity 5 for prediction 100
        assert_eq!(store.user(10).unwrap().points, 35);
    }

    #[tokio::test]
    async fn test_queue_full_is_immediate() {
        let store = seeded_store();
        let gate = Arc::new(Semaphore::new(0));
        let mut repos = store.repositories();
        repos.matches = Arc::new(GatedMatches {
            inner: repos.matches.clone(),
            gate: Arc::clone(&gate),
        });
        let svc = service(
            repos,
            Arc::new(InMemoryEventBus::new()),
            ScoringServiceConfig {
                queue_capacity: 2,
                workers: 1,
                history_size: 16,
            },
        );

        // the single worker takes the first task and blocks on the gate
        let busy = svc.queue_points_calculation(1, None).unwrap();
        for _ in 0..100 {
            if svc.get_task_status(&busy).unwrap().status == TaskStatus::Processing {
                break;
            }
            tokio::task::yield_now().await;
        }
        svc.queue_points_calculation(1, None).unwrap();
        svc.queue_points_calculation(1, None).unwrap();
        let err = svc.queue_points_calculation(1, None).unwrap_err();
        assert_eq!(err, ScoringError::QueueFull { capacity: 2 });

        let status = svc.queue_status();
        assert_eq!(status.queue_length, 2);
        assert_eq!(status.active_tasks, 3);

        gate.add_permits(10);
        wait_terminal(&svc, &busy).await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_tasks() {
        let store = seeded_store();
        let gate = Arc::new(Semaphore::new(0));
        let mut repos = store.repositories();
        repos.matches = Arc::new(GatedMatches {
            inner: repos.matches.clone(),
            gate: Arc::clone(&gate),
        });
        let svc = service(
            repos,
            Arc::new(InMemoryEventBus::new()),
            ScoringServiceConfig {
                queue_capacity: 4,
                workers: 1,
                history_size: 16,
            },
        );

        let first = svc.queue_points_calculation(1, None).unwrap();
        for _ in 0..100 {
            if svc.get_task_status(&first).unwrap().status == TaskStatus::Processing {
                break;
            }
            tokio::task::yield_now().await;
        }
        let queued = svc.queue_points_calculation(1, None).unwrap();

        // in-flight task may finish once released
        gate.add_permits(10);
        svc.shutdown(Duration::from_secs(5)).await;

        assert_eq!(svc.get_task_status(&first).unwrap().status, TaskStatus::Completed);
        let queued = svc.get_task_status(&queued).unwrap();
        assert_eq!(queued.status, TaskStatus::Failed);
        assert!(queued.error.unwrap().contains("shut down"));
        assert_eq!(
            svc.queue_points_calculation(1, None).unwrap_err(),
            ScoringError::ShuttingDown
        );
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let store = InMemoryStore::new_shared();
        let svc = service(
            store.repositories(),
            Arc::new(InMemoryEventBus::new()),
            ScoringServiceConfig {
                queue_capacity: 8,
                workers: 2,
                history_size: 2,
            },
        );

        let ids: Vec<String> = (0..3)
            .map(|_| svc.queue_points_calculation(99, None).unwrap())
            .collect();
        for _ in 0..200 {
            if svc.queue_status().active_tasks == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let known = ids.iter().filter(|id| svc.get_task_status(id).is_ok()).count();
        assert_eq!(known, 2);
        assert!(matches!(
            svc.get_task_status("points_0_0"),
            Err(ScoringError::TaskNotFound(_))
        ));
    }
}
