//! Deferred leaderboard invalidation under bursts of score updates.

use std::sync::Arc;
use std::time::Duration;

use scoreline_core::{ManualClock, Tournament, User};
use scoreline_db_memory::InMemoryStore;
use scoreline_server::cache::{InMemoryRemoteCache, LayeredCache, MemoryCache, keys};
use scoreline_server::config::MonitoringConfig;
use scoreline_server::leaderboard::{
    CacheMonitor, CacheServiceManager, InvalidationService, LeaderboardCacheConfig,
    LeaderboardCacheService,
};
use time::macros::datetime;

struct Harness {
    manager: CacheServiceManager,
    cache: Arc<LayeredCache>,
}

fn harness() -> Harness {
    let store = InMemoryStore::new_shared();
    store.insert_user(User::new(1, "alice"));
    let cache = Arc::new(LayeredCache::new(
        Arc::new(MemoryCache::default()),
        InMemoryRemoteCache::new_shared(),
    ));
    let clock = Arc::new(ManualClock::new(datetime!(2024-05-01 12:00 UTC)));
    let leaderboard = Arc::new(LeaderboardCacheService::new(
        Arc::clone(&cache),
        store.repositories().users,
        LeaderboardCacheConfig::default(),
        clock.clone(),
    ));
    let invalidation = Arc::new(InvalidationService::new(Arc::clone(&leaderboard)));
    let monitor = Arc::new(CacheMonitor::new(
        Arc::clone(&leaderboard),
        Arc::clone(&cache),
        MonitoringConfig::default(),
        clock,
    ));
    Harness {
        manager: CacheServiceManager::new(leaderboard, invalidation, monitor, false),
        cache,
    }
}

async fn cached(h: &Harness, tournament: Tournament) -> bool {
    h.cache.exists(&keys::leaderboard(tournament)).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_burst_collapses_into_one_invalidation() {
    let h = harness();
    h.manager.leaderboard().refresh_cache(Tournament::Summer).await.unwrap();
    let delay = Duration::from_secs(5);

    for _ in 0..10 {
        h.manager.schedule_batch_invalidation(&[Tournament::Summer], delay);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(h.manager.invalidation().pending_count(), 1);
    assert!(cached(&h, Tournament::Summer).await);

    tokio::time::sleep(delay).await;
    assert_eq!(h.manager.invalidation().executed_count(), 1);
    assert!(!cached(&h, Tournament::Summer).await);
}

#[tokio::test(start_paused = true)]
async fn test_tournaments_debounce_independently() {
    let h = harness();
    for t in [Tournament::Spring, Tournament::Winter] {
        h.manager.leaderboard().refresh_cache(t).await.unwrap();
    }

    h.manager
        .schedule_batch_invalidation(&[Tournament::Spring], Duration::from_secs(2));
    h.manager
        .schedule_batch_invalidation(&[Tournament::Winter], Duration::from_secs(10));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!cached(&h, Tournament::Spring).await);
    assert!(cached(&h, Tournament::Winter).await);
    assert_eq!(h.manager.invalidation().pending_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_flushes_pending_invalidations() {
    let h = harness();
    h.manager.leaderboard().refresh_cache(Tournament::Autumn).await.unwrap();
    h.manager
        .schedule_batch_invalidation(&[Tournament::Autumn], Duration::from_secs(600));

    h.manager.stop().await;
    assert_eq!(h.manager.invalidation().pending_count(), 0);
    assert!(!cached(&h, Tournament::Autumn).await);
}

#[tokio::test]
async fn test_invalidate_now_drops_global_too() {
    let h = harness();
    for t in [Tournament::Spring, Tournament::Global] {
        h.manager.leaderboard().refresh_cache(t).await.unwrap();
    }
    h.manager.invalidate_now(&[Tournament::Spring]).await.unwrap();
    assert!(!cached(&h, Tournament::Spring).await);
    assert!(!cached(&h, Tournament::Global).await);
}
