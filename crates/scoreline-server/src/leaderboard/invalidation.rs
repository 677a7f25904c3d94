//! Targeted and debounced leaderboard invalidation.
//!
//! A burst of point updates for one tournament collapses into a single
//! deferred invalidation: scheduling a tournament that already has a pending
//! timer cancels that timer and starts a new one.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scoreline_core::{MatchId, Tournament, UserId};

use super::error::{LeaderboardError, LeaderboardResult};
use super::service::LeaderboardCacheService;
use crate::cache::keys;
use crate::metrics;

#[derive(Debug)]
struct PendingInvalidation {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Timers {
    pending: HashMap<Tournament, PendingInvalidation>,
    next_generation: u64,
}

pub struct InvalidationService {
    leaderboard: Arc<LeaderboardCacheService>,
    timers: Arc<Mutex<Timers>>,
    executed: Arc<AtomicU64>,
}

impl InvalidationService {
    pub fn new(leaderboard: Arc<LeaderboardCacheService>) -> Self {
        Self {
            leaderboard,
            timers: Arc::new(Mutex::new(Timers::default())),
            executed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A user's points changed: drop their cached profile and the
    /// tournament's leaderboard (which cascades to `GLOBAL`).
    pub async fn invalidate_on_points_update(
        &self,
        user_id: UserId,
        tournament: Tournament,
    ) -> LeaderboardResult<()> {
        if let Err(e) = self.leaderboard.cache().delete(&keys::user(user_id)).await {
            warn!(user_id, error = %e, "Failed to invalidate user cache");
        }
        self.leaderboard.invalidate_leaderboard(tournament).await?;
        metrics::record_invalidation("points");
        debug!(user_id, tournament = %tournament, "Invalidated on points update");
        Ok(())
    }

    pub async fn invalidate_on_match_complete(
        &self,
        match_id: MatchId,
        tournament: Tournament,
    ) -> LeaderboardResult<()> {
        self.leaderboard.invalidate_leaderboard(tournament).await?;
        metrics::record_invalidation("match");
        info!(match_id, tournament = %tournament, "Invalidated leaderboards on match completion");
        Ok(())
    }

    /// Invalidate several tournaments, continuing past failures.
    pub async fn batch_invalidate(&self, tournaments: &[Tournament]) -> LeaderboardResult<()> {
        let mut failures = Vec::new();
        for &tournament in tournaments {
            if let Err(e) = self.leaderboard.invalidate_leaderboard(tournament).await {
                warn!(tournament = %tournament, error = %e, "Batch invalidation failed");
                failures.push((tournament, e));
            }
        }
        metrics::record_invalidation("batch");
        LeaderboardError::collect("batch invalidation", failures)
    }

    /// Invalidate `tournament` after `delay`, replacing any pending timer for
    /// the same tournament.
    pub fn schedule_invalidation(&self, tournament: Tournament, delay: Duration) {
        let mut timers = self.timers.lock();
        timers.next_generation += 1;
        let generation = timers.next_generation;

        let leaderboard = Arc::clone(&self.leaderboard);
        let shared = Arc::clone(&self.timers);
        let executed = Arc::clone(&self.executed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                // a newer timer or a flush owns the tournament now
                let mut timers = shared.lock();
                match timers.pending.get(&tournament) {
                    Some(p) if p.generation == generation => {
                        timers.pending.remove(&tournament);
                    }
                    _ => return,
                }
            }
            executed.fetch_add(1, Ordering::SeqCst);
            metrics::record_invalidation("scheduled");
            if let Err(e) = leaderboard.invalidate_leaderboard(tournament).await {
                warn!(tournament = %tournament, error = %e, "Scheduled invalidation failed");
            } else {
                debug!(tournament = %tournament, "Scheduled invalidation executed");
            }
        });

        if let Some(previous) = timers
            .pending
            .insert(tournament, PendingInvalidation { generation, handle })
        {
            previous.handle.abort();
            debug!(tournament = %tournament, "Rescheduled pending invalidation");
        }
    }

    /// Run every pending invalidation now.
    pub async fn flush_scheduled_invalidations(&self) -> LeaderboardResult<()> {
        let drained: Vec<Tournament> = {
            let mut timers = self.timers.lock();
            timers
                .pending
                .drain()
                .map(|(tournament, pending)| {
                    pending.handle.abort();
                    tournament
                })
                .collect()
        };
        if drained.is_empty() {
            return Ok(());
        }

        info!(count = drained.len(), "Flushing scheduled invalidations");
        self.executed
            .fetch_add(drained.len() as u64, Ordering::SeqCst);
        self.batch_invalidate(&drained).await
    }

    pub fn pending_count(&self) -> usize {
        self.timers.lock().pending.len()
    }

    /// Deferred invalidations that have run, by timer or by flush.
    pub fn executed_count(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for InvalidationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationService")
            .field("pending", &self.pending_count())
            .field("executed", &self.executed_count())
            .finish()
    }
}
