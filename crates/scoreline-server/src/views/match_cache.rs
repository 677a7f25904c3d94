//! Cache-aside views over match data.
//!
//! | View | Key | TTL |
//! |---|---|---|
//! | detail | `match:detail:{id}` | 5 min, 1 min for hot matches |
//! | filtered list | `match:list:...` | 2 min |
//! | upcoming | `match:upcoming:{limit}` | 2 min |
//! | live | `match:live` | 30 s |
//! | finished | `match:finished:{limit}` | 10 min |

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use scoreline_core::{Match, MatchId, MatchStatus, SharedClock};
use scoreline_storage::{MatchListFilter, MatchRepository, StorageError};

use crate::cache::{CacheError, LayeredCache, LayeredCacheStats, keys};
use crate::metrics;

pub const MATCH_DETAIL_TTL: Duration = Duration::from_secs(5 * 60);
pub const HOT_MATCH_TTL: Duration = Duration::from_secs(60);
pub const MATCH_LIST_TTL: Duration = Duration::from_secs(2 * 60);
pub const LIVE_MATCH_TTL: Duration = Duration::from_secs(30);
pub const FINISHED_MATCH_TTL: Duration = Duration::from_secs(10 * 60);

pub struct MatchCacheService {
    cache: Arc<LayeredCache>,
    matches: Arc<dyn MatchRepository>,
    clock: SharedClock,
}

impl MatchCacheService {
    pub fn new(cache: Arc<LayeredCache>, matches: Arc<dyn MatchRepository>, clock: SharedClock) -> Self {
        Self {
            cache,
            matches,
            clock,
        }
    }

    /// Read `key`, or load and cache it. Cache failures only cost a reload.
    async fn cached<T, F, Fut>(&self, key: &str, ttl: impl Fn(&T) -> Duration, load: F) -> Result<T, StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        match self.cache.get_decoded::<T>(key).await {
            Ok(value) => {
                debug!(key, "Match view served from cache");
                return Ok(value);
            }
            Err(e) if e.is_miss() => {}
            Err(CacheError::InvalidValue(reason)) => {
                warn!(key, reason = %reason, "Discarding undecodable cached match view");
            }
            Err(e) => warn!(key, error = %e, "Match cache read failed"),
        }

        let value = load().await?;
        if let Err(e) = self.cache.set_encoded(key, &value, ttl(&value)).await {
            warn!(key, error = %e, "Failed to cache match view");
        }
        debug!(key, "Match view loaded from repository");
        Ok(value)
    }

    pub async fn get_match(&self, id: MatchId) -> Result<Match, StorageError> {
        let now = self.clock.now();
        self.cached(
            &keys::match_detail(id),
            |m: &Match| if m.is_hot(now) { HOT_MATCH_TTL } else { MATCH_DETAIL_TTL },
            || self.matches.get_by_id(id),
        )
        .await
    }

    pub async fn list_matches(&self, filter: &MatchListFilter) -> Result<Vec<Match>, StorageError> {
        self.cached(&keys::match_list(filter), |_: &Vec<Match>| MATCH_LIST_TTL, || {
            self.matches.list(filter)
        })
        .await
    }

    /// Next `limit` upcoming matches by start time.
    pub async fn upcoming_matches(&self, limit: usize) -> Result<Vec<Match>, StorageError> {
        let filter = MatchListFilter::with_status(MatchStatus::Upcoming, limit);
        self.cached(&keys::match_upcoming(limit), |_: &Vec<Match>| MATCH_LIST_TTL, || async move {
            self.matches.list(&filter).await
        })
        .await
    }

    pub async fn live_matches(&self) -> Result<Vec<Match>, StorageError> {
        let filter = MatchListFilter::with_status(MatchStatus::Live, 0);
        self.cached(keys::MATCH_LIVE_KEY, |_: &Vec<Match>| LIVE_MATCH_TTL, || async move {
            self.matches.list(&filter).await
        })
        .await
    }

    /// Most recent `limit` finished matches, newest first.
    pub async fn finished_matches(&self, limit: usize) -> Result<Vec<Match>, StorageError> {
        let filter = MatchListFilter::with_status(MatchStatus::Finished, 0);
        self.cached(&keys::match_finished(limit), |_: &Vec<Match>| FINISHED_MATCH_TTL, || async move {
            let mut matches = self.matches.list(&filter).await?;
            matches.reverse();
            if limit > 0 {
                matches.truncate(limit);
            }
            Ok(matches)
        })
        .await
    }

    pub async fn invalidate_match(&self, id: MatchId) {
        for key in [keys::match_detail(id), keys::match_hot(id)] {
            if let Err(e) = self.cache.delete(&key).await {
                warn!(key = %key, error = %e, "Failed to invalidate match cache");
            }
        }
        metrics::record_invalidation("match_detail");
    }

    pub async fn invalidate_match_lists(&self) {
        let upcoming = format!("{}*", keys::MATCH_UPCOMING_PREFIX);
        let list = format!("{}*", keys::MATCH_LIST_PREFIX);
        let finished = format!("{}*", keys::MATCH_FINISHED_PREFIX);
        self.delete_patterns(&[&list, &upcoming, keys::MATCH_LIVE_KEY, &finished])
            .await;
        metrics::record_invalidation("match_lists");
    }

    pub async fn invalidate_all_match_caches(&self) {
        let detail = format!("{}*", keys::MATCH_DETAIL_PREFIX);
        let hot = format!("{}*", keys::MATCH_HOT_PREFIX);
        let upcoming = format!("{}*", keys::MATCH_UPCOMING_PREFIX);
        let list = format!("{}*", keys::MATCH_LIST_PREFIX);
        let finished = format!("{}*", keys::MATCH_FINISHED_PREFIX);
        self.delete_patterns(&[&detail, &list, &hot, &upcoming, keys::MATCH_LIVE_KEY, &finished])
            .await;
        metrics::record_invalidation("match_all");
    }

    async fn delete_patterns(&self, patterns: &[&str]) {
        for pattern in patterns {
            if let Err(e) = self.cache.delete_pattern(pattern).await {
                warn!(pattern, error = %e, "Failed to invalidate match caches");
            }
        }
    }

    pub fn cache_stats(&self) -> LayeredCacheStats {
        self.cache.stats()
    }
}

impl std::fmt::Debug for MatchCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchCacheService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryRemoteCache, MemoryCache};
    use scoreline_core::{ManualClock, Team, Tournament};
    use scoreline_db_memory::InMemoryStore;
    use time::macros::datetime;

    struct Fixture {
        svc: MatchCacheService,
        store: Arc<InMemoryStore>,
        cache: Arc<LayeredCache>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryStore::new_shared();
        store.insert_match(Match::scheduled(1, "A", "B", Tournament::Spring, datetime!(2024-05-01 18:30 UTC)));
        store.insert_match(Match::scheduled(2, "C", "D", Tournament::Spring, datetime!(2024-05-03 18:00 UTC)));
        let mut done = Match::scheduled(3, "E", "F", Tournament::Summer, datetime!(2024-04-01 18:00 UTC));
        done.finish(Team::A, 1, 0);
        store.insert_match(done);
        let mut older = Match::scheduled(4, "G", "H", Tournament::Summer, datetime!(2024-03-01 18:00 UTC));
        older.finish(Team::B, 0, 3);
        store.insert_match(older);

        let cache = Arc::new(LayeredCache::new(
            Arc::new(MemoryCache::default()),
            InMemoryRemoteCache::new_shared(),
        ));
        let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 18:00 UTC)));
        let svc = MatchCacheService::new(Arc::clone(&cache), store.repositories().matches, clock);
        Fixture { svc, store, cache }
    }

    #[tokio::test]
    async fn test_hot_match_gets_short_ttl() {
        let f = fixture();
        f.svc.get_match(1).await.unwrap();
        f.svc.get_match(2).await.unwrap();

        let hot = f.cache.get_ttl("match:detail:1").await.unwrap().unwrap();
        let cold = f.cache.get_ttl("match:detail:2").await.unwrap().unwrap();
        assert!(hot <= HOT_MATCH_TTL);
        assert!(cold > HOT_MATCH_TTL);
    }

    #[tokio::test]
    async fn test_detail_served_from_cache_until_invalidated() {
        let f = fixture();
        let first = f.svc.get_match(2).await.unwrap();

        let mut changed = first.clone();
        changed.team_a = "Renamed".into();
        f.store.update_match(changed).unwrap();
        assert_eq!(f.svc.get_match(2).await.unwrap().team_a, "C");

        f.svc.invalidate_match(2).await;
        assert_eq!(f.svc.get_match(2).await.unwrap().team_a, "Renamed");
    }

    #[tokio::test]
    async fn test_finished_newest_first() {
        let f = fixture();
        let finished = f.svc.finished_matches(1).await.unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, 3);
        assert!(f.cache.exists("match:finished:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_invalidation_spares_details() {
        let f = fixture();
        f.svc.get_match(1).await.unwrap();
        f.svc.upcoming_matches(5).await.unwrap();
        f.svc.live_matches().await.unwrap();
        f.svc
            .list_matches(&MatchListFilter {
                tournament: Some(Tournament::Spring),
                ..Default::default()
            })
            .await
            .unwrap();

        f.svc.invalidate_match_lists().await;
        assert!(!f.cache.exists("match:upcoming:5").await.unwrap());
        assert!(!f.cache.exists("match:live").await.unwrap());
        assert!(!f.cache.exists("match:list:tournament:SPRING:limit:0:offset:0").await.unwrap());
        assert!(f.cache.exists("match:detail:1").await.unwrap());

        f.svc.invalidate_all_match_caches().await;
        assert!(!f.cache.exists("match:detail:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_upcoming_filters_status() {
        let f = fixture();
        let upcoming = f.svc.upcoming_matches(10).await.unwrap();
        let ids: Vec<_> = upcoming.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
