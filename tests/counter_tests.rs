//! End-to-end behavior of hit counting and write-behind flushing.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use most_read::types::{AbortReason, DropReason, FlushOutcome, RecordOutcome};
use most_read::SharedCache;

mod common;
use common::test_helpers::{today, TestEnvironment};

#[tokio::test]
async fn test_hits_below_threshold_are_all_counted() {
    let env = TestEnvironment::with_threshold(1_000);

    for _ in 0..25 {
        let outcome = env.app.counter.record_hit(42).await;
        assert_eq!(outcome, RecordOutcome::Recorded { flush: None });
    }

    let batch = env.app.counter.pending_batch().await.unwrap().unwrap();
    assert_eq!(batch.count(42), 25);
    assert!(batch.flushing.is_none());
    assert_eq!(env.app.counter.hits_since_write().await.unwrap(), 25);
    assert_eq!(env.store.upsert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_threshold_flushes_every_item() {
    let env = TestEnvironment::with_threshold(5);

    for item in 1..=4 {
        let outcome = env.app.counter.record_hit(item).await;
        assert!(outcome.flush().is_none());
    }
    let outcome = env.app.counter.record_hit(5).await;

    assert_eq!(
        outcome.flush(),
        Some(&FlushOutcome::Persisted {
            date: today(),
            items: 5,
            hits: 5
        })
    );
    for item in 1..=5 {
        assert_eq!(env.store.inner.hits_for(item, today()), 1);
    }

    let batch = env.app.counter.pending_batch().await.unwrap().unwrap();
    assert!(batch.is_empty());
    assert!(batch.flushing.is_none());
    assert_eq!(env.app.counter.hits_since_write().await.unwrap(), 0);
}

#[tokio::test]
async fn test_flushes_accumulate_in_the_store() {
    let env = TestEnvironment::with_threshold(3);

    for _ in 0..9 {
        env.app.counter.record_hit(7).await;
    }

    assert_eq!(env.store.inner.hits_for(7, today()), 9);
    assert_eq!(env.store.upsert_calls.load(Ordering::SeqCst), 3);
    assert_eq!(env.pending_total().await, 0);
}

#[tokio::test]
async fn test_failed_upsert_reintegrates_counts() {
    let env = TestEnvironment::with_threshold(3);
    env.store.set_failing(true);

    env.app.counter.record_hit(1).await;
    env.app.counter.record_hit(2).await;
    let outcome = env.app.counter.record_hit(3).await;

    assert_eq!(
        outcome.flush(),
        Some(&FlushOutcome::Reintegrated {
            items: 3,
            hits: 3,
            lost: vec![]
        })
    );
    assert_eq!(env.store.inner.total_hits(), 0);
    // Counts are back in the batch but do not count toward the next flush.
    assert_eq!(env.pending_total().await, 3);
    assert_eq!(env.app.counter.hits_since_write().await.unwrap(), 0);

    env.store.set_failing(false);
    for _ in 0..3 {
        env.app.counter.record_hit(1).await;
    }

    assert_eq!(env.store.inner.hits_for(1, today()), 4);
    assert_eq!(env.store.inner.hits_for(2, today()), 1);
    assert_eq!(env.store.inner.hits_for(3, today()), 1);
    assert_eq!(env.pending_total().await, 0);

    let metrics = env.app.metrics.counters.clone();
    assert_eq!(metrics.upsert_failures.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.hits_reintegrated.load(Ordering::Relaxed), 3);
}

#[tokio::test]
async fn test_active_flush_token_blocks_other_flushers() {
    let env = TestEnvironment::with_threshold(1);
    let key = env.app.counter.keys().counters.clone();
    env.cache
        .set(
            &key,
            json!({"flushing": 12345, "counts": {"9": 4}}),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

    let outcome = env.app.counter.record_hit(9).await;

    assert_eq!(
        outcome.flush(),
        Some(&FlushOutcome::Aborted(AbortReason::AlreadyFlushing))
    );
    let batch = env.app.counter.pending_batch().await.unwrap().unwrap();
    assert_eq!(batch.count(9), 5);
    assert_eq!(batch.flushing.map(|t| t.get()), Some(12345));
    assert_eq!(env.store.upsert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_batch_drops_hits_without_repair() {
    let env = TestEnvironment::with_threshold(1);
    let key = env.app.counter.keys().counters.clone();
    env.cache
        .set(&key, json!({"flushing": "yes", "counts": []}), Duration::from_secs(60))
        .await
        .unwrap();

    let outcome = env.app.counter.record_hit(1).await;

    assert_eq!(outcome, RecordOutcome::Dropped(DropReason::MalformedState));
    assert_eq!(
        env.cache.get(&key).await.unwrap(),
        Some(json!({"flushing": "yes", "counts": []}))
    );
    assert_eq!(env.store.upsert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expired_batch_is_recreated() {
    let mut config = common::test_helpers::create_test_config(1_000);
    config.retention.days_to_keep_hits = 1;
    let env = TestEnvironment::new(config);
    let key = env.app.counter.keys().counters.clone();

    env.app.counter.record_hit(1).await;
    env.cache
        .set(&key, json!({"flushing": false, "counts": {"1": 3}}), Duration::from_millis(20))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    env.app.counter.record_hit(2).await;
    let batch = env.app.counter.pending_batch().await.unwrap().unwrap();
    assert_eq!(batch.count(1), 0);
    assert_eq!(batch.count(2), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hits_keep_the_batch_well_formed() {
    let env = Arc::new(TestEnvironment::with_threshold(1_000_000));
    let mut handles = Vec::new();

    for worker in 0..8u64 {
        let env = Arc::clone(&env);
        handles.push(tokio::spawn(async move {
            for i in 0..50u64 {
                env.app.counter.record_hit((worker + i) % 4 + 1).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Unsynchronized updates may lose hits but never invent them.
    let batch = env.app.counter.pending_batch().await.unwrap().unwrap();
    assert!(batch.total() >= 1);
    assert!(batch.total() <= 400);
    assert!(batch.flushing.is_none());
    assert!(batch.counts().all(|(item, _)| (1..=4).contains(&item)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_flushing_leaves_consistent_state() {
    let env = Arc::new(TestEnvironment::with_threshold(10));
    let mut handles = Vec::new();

    for worker in 0..4u64 {
        let env = Arc::clone(&env);
        handles.push(tokio::spawn(async move {
            for _ in 0..40 {
                env.app.counter.record_hit(worker + 1).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let batch = env.app.counter.pending_batch().await.unwrap().unwrap();
    assert!(batch.counts().all(|(item, _)| (1..=4).contains(&item)));
    assert!(env
        .store
        .inner
        .records()
        .iter()
        .all(|r| r.date == today() && (1..=4).contains(&r.item_id) && r.hits > 0));
}

#[tokio::test]
async fn test_flush_completes_when_caller_is_dropped() {
    let mut config = common::test_helpers::create_test_config(3);
    config.counters.flush_grace_period_ms = 200;
    let env = TestEnvironment::new(config);

    env.app.counter.record_hit(1).await;
    env.app.counter.record_hit(2).await;
    // The request that crosses the threshold gives up during the grace period.
    let third = tokio::time::timeout(Duration::from_millis(20), env.app.counter.record_hit(1)).await;
    assert!(third.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let batch = env.app.counter.pending_batch().await.unwrap().unwrap();
    assert!(batch.flushing.is_none());
    assert!(batch.is_empty());
    assert_eq!(env.store.inner.hits_for(1, today()), 2);
    assert_eq!(env.store.inner.hits_for(2, today()), 1);

    // Later flushes are not blocked by a leftover claim.
    for _ in 0..3 {
        env.app.counter.record_hit(2).await;
    }
    assert_eq!(env.store.inner.hits_for(2, today()), 4);
    assert_eq!(env.pending_total().await, 0);
}
