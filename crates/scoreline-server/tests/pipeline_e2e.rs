//! End-to-end flow: a finished match is scored by the async workers, the
//! leaderboard caches are dropped, and downstream handlers see the result.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use scoreline_core::events::{Event, EventPayload, EventType, FnHandler};
use scoreline_core::{Match, Prediction, ScoringRule, Team, Tournament, User, system_clock};
use scoreline_db_memory::InMemoryStore;
use scoreline_server::cache::keys;
use scoreline_server::{AppConfig, EventBusMode, InMemoryRemoteCache, Pipeline};
use time::macros::datetime;

fn seeded_store() -> Arc<InMemoryStore> {
    let store = InMemoryStore::new_shared();
    let mut m = Match::scheduled(1, "Lions", "Tigers", Tournament::Spring, datetime!(2024-05-01 18:00 UTC));
    m.finish(Team::A, 2, 1);
    store.insert_match(m);
    store.insert_user(User::new(10, "alice"));
    store.insert_user(User::new(11, "bob"));
    store.insert_prediction(
        Prediction::new(100, 10, 1, Team::A, 2, 1, datetime!(2024-04-30 12:00 UTC)),
        12,
    );
    store.insert_prediction(
        Prediction::new(101, 11, 1, Team::B, 0, 1, datetime!(2024-04-30 13:00 UTC)),
        0,
    );
    store
        .insert_rule(ScoringRule {
            id: 1,
            name: "default".into(),
            is_active: true,
            base_points: 10,
            enable_vote_reward: true,
            vote_reward_points: 1,
            max_vote_reward: 10,
            ..ScoringRule::default()
        })
        .unwrap();
    store
}

fn config(mode: EventBusMode) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.event_bus.mode = mode;
    cfg.leaderboard.refresh_on_points = false;
    cfg.monitoring.enabled = false;
    cfg.scoring.shutdown_timeout_secs = 5;
    cfg
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

async fn run_flow(mode: EventBusMode) {
    let store = seeded_store();
    let pipeline = Pipeline::build(
        config(mode),
        store.repositories(),
        InMemoryRemoteCache::new_shared(),
        system_clock(),
    );

    let calculated = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calculated);
    pipeline.bus().subscribe(
        EventType::PointsCalculated,
        Arc::new(FnHandler::new("test-observer", move |event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                if let EventPayload::PointsCalculated(p) = &event.payload {
                    assert_eq!(p.match_id, 1);
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        })),
    );

    pipeline.start().await;

    // prewarm cached the pre-scoring standings
    let before = pipeline.leaderboard().get_leaderboard(Tournament::Spring).await.unwrap();
    assert!(before.iter().all(|e| e.points == 0));

    assert!(store.calculation(1).is_none());
    pipeline
        .cache()
        .set(&keys::user(10), b"stale".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();
    let m = pipeline.matches().get_match(1).await.unwrap();
    tokio_test::assert_ok!(pipeline.report_match_finished(&m).await);

    eventually(|| calculated.load(Ordering::SeqCst) == 1).await;
    eventually(|| pipeline.scoring().notifications().notified_count() == 1).await;

    assert_eq!(store.prediction(100).unwrap().prediction.points, 25);
    assert_eq!(store.prediction(101).unwrap().prediction.points, 0);
    assert_eq!(store.user(10).unwrap().points, 25);
    assert_eq!(store.calculation(1).unwrap().total_points, 25);

    let after = pipeline.leaderboard().get_leaderboard(Tournament::Spring).await.unwrap();
    assert_eq!(after[0].user_id, 10);
    assert_eq!(after[0].points, 25);
    assert!(!pipeline.cache().exists(&keys::user(10)).await.unwrap());

    let report: serde_json::Value =
        serde_json::from_str(&pipeline.cache_report_json().unwrap()).unwrap();
    assert!(report["recommendations"].is_array());

    pipeline.shutdown().await;
    assert!(pipeline.points_service().is_shutting_down());
}

#[tokio::test]
async fn test_finished_match_scores_through_async_bus() {
    run_flow(EventBusMode::Async).await;
}

#[tokio::test]
async fn test_finished_match_scores_through_sync_bus() {
    run_flow(EventBusMode::Sync).await;
}

#[tokio::test]
async fn test_vote_refreshes_hot_predictions() {
    let store = seeded_store();
    let pipeline = Pipeline::build(
        config(EventBusMode::Sync),
        store.repositories(),
        InMemoryRemoteCache::new_shared(),
        system_clock(),
    );

    let updates = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&updates);
    pipeline.bus().subscribe(
        EventType::HotPredictionsUpdated,
        Arc::new(FnHandler::new("hot-observer", move |event: Event| {
            let counter = Arc::clone(&counter);
            async move {
                if let EventPayload::HotPredictionsUpdated(p) = &event.payload {
                    assert_eq!(p.total_count, 2);
                    assert_eq!(p.hot_predictions[0].prediction.id, 101);
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        })),
    );
    pipeline.start().await;

    let top = pipeline.hot_predictions().get_hot_predictions(1, 1).await.unwrap();
    assert_eq!(top[0].prediction.id, 100);

    let votes = store.vote(101, 20).unwrap();
    pipeline
        .bus()
        .publish(Event::prediction_voted(101, 1, 11, votes))
        .await
        .unwrap();

    eventually(|| updates.load(Ordering::SeqCst) == 1).await;
    let top = pipeline.hot_predictions().get_hot_predictions(1, 1).await.unwrap();
    assert_eq!(top[0].prediction.id, 101);

    pipeline.shutdown().await;
}
