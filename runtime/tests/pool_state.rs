//! Session pool state machine: generations, resets, and thresholds.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio_test::{assert_pending, assert_ready_ok};

use common::{pool_config, results_page, FakeLauncher};
use placerank::MapVariant;
use placerank_runtime::config::PoolConfig;
use placerank_runtime::pool::{PoolError, PoolState, ResetReason, SessionPool};

fn any_page(_: &str) -> String {
    results_page(Some(1), MapVariant::Current)
}

async fn pool_with(config: PoolConfig) -> (Arc<FakeLauncher>, Arc<SessionPool>) {
    let launcher = FakeLauncher::new(any_page);
    let pool = SessionPool::start(launcher.clone(), config, None).await.unwrap();
    (launcher, pool)
}

#[tokio::test]
async fn test_idle_session_is_reused() {
    let (launcher, pool) = pool_with(pool_config()).await;

    let s = pool.acquire().await.unwrap();
    assert_eq!(s.generation(), 0);
    pool.release(s).await;
    assert_eq!(pool.stats().await.idle, 1);

    let s = pool.acquire().await.unwrap();
    assert_eq!(s.generation(), 0);
    assert_eq!(pool.stats().await.idle, 0);
    assert_eq!(pool.stats().await.active_contexts, 1);
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn test_reset_bumps_generation_and_drops_stale_sessions() {
    let (launcher, pool) = pool_with(pool_config()).await;

    let held = pool.acquire().await.unwrap();
    let idle = pool.acquire().await.unwrap();
    pool.release(idle).await;

    assert!(pool.reset(ResetReason::Manual).await.unwrap());
    assert_eq!(pool.generation(), 1);
    assert_eq!(pool.state(), PoolState::Active);
    assert_eq!(launcher.launches(), 2);
    assert_eq!(launcher.shutdowns.load(Ordering::SeqCst), 1);

    // A session from before the reset never goes back into the pool.
    pool.release(held).await;
    let stats = pool.stats().await;
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.resets, 1);

    let fresh = pool.acquire().await.unwrap();
    assert_eq!(fresh.generation(), 1);
}

#[tokio::test]
async fn test_concurrent_reset_is_a_no_op() {
    let config = PoolConfig {
        cooldown_base_ms: 50,
        ..pool_config()
    };
    let (launcher, pool) = pool_with(config).await;

    let (first, second) = tokio::join!(
        pool.reset(ResetReason::HardBlock),
        pool.reset(ResetReason::FailureThreshold)
    );
    assert!(first.unwrap());
    assert!(!second.unwrap());
    assert_eq!(pool.generation(), 1);
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn test_acquire_waits_for_reset() {
    let config = PoolConfig {
        cooldown_base_ms: 100,
        ..pool_config()
    };
    let (_launcher, pool) = pool_with(config).await;

    let resetting = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.reset(ResetReason::Manual).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(pool.state(), PoolState::Resetting);

    let mut waiting = tokio_test::task::spawn(pool.acquire());
    assert_pending!(waiting.poll());

    assert!(resetting.await.unwrap().unwrap());
    assert!(waiting.is_woken());
    let session = assert_ready_ok!(waiting.poll());
    assert_eq!(session.generation(), 1);
}

#[tokio::test]
async fn test_failure_threshold_triggers_reset() {
    let (_launcher, pool) = pool_with(pool_config()).await;

    for _ in 0..3 {
        pool.before_request().await.unwrap();
        pool.record_outcome(true);
    }
    assert_eq!(pool.generation(), 0);
    assert_eq!(pool.stats().await.consecutive_failures, 3);

    pool.before_request().await.unwrap();
    assert_eq!(pool.generation(), 1);
    assert_eq!(pool.stats().await.consecutive_failures, 0);
}

#[tokio::test]
async fn test_success_clears_failure_run() {
    let (_launcher, pool) = pool_with(pool_config()).await;

    pool.record_outcome(true);
    pool.record_outcome(true);
    pool.record_outcome(false);
    pool.record_outcome(true);
    pool.before_request().await.unwrap();
    assert_eq!(pool.generation(), 0);
    assert_eq!(pool.stats().await.consecutive_failures, 1);
}

#[tokio::test]
async fn test_session_limit_triggers_reset() {
    let config = PoolConfig {
        session_request_limit: 2,
        ..pool_config()
    };
    let (_launcher, pool) = pool_with(config).await;

    pool.before_request().await.unwrap();
    assert_eq!(pool.generation(), 0);
    pool.before_request().await.unwrap();
    assert_eq!(pool.generation(), 1);
    assert_eq!(pool.stats().await.requests_since_reset, 0);
}

#[tokio::test]
async fn test_relaunch_failure_is_fatal() {
    let launcher = FakeLauncher::limited(any_page, 1);
    let pool = SessionPool::start(launcher.clone(), pool_config(), None)
        .await
        .unwrap();

    let err = pool.reset(ResetReason::HardBlock).await.unwrap_err();
    assert!(matches!(err, PoolError::Launch { .. }));
    assert!(err.is_fatal());
    assert_eq!(pool.state(), PoolState::Active);

    let err = pool.acquire().await.err().unwrap();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_start_failure_reports_backend() {
    let launcher = FakeLauncher::limited(any_page, 0);
    let err = SessionPool::start(launcher, pool_config(), None)
        .await
        .err()
        .unwrap();
    match err {
        PoolError::Launch { backend, .. } => assert_eq!(backend, "fake"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_sessions_always_match_live_generation() {
    let (_launcher, pool) = pool_with(pool_config()).await;

    for round in 0..20u64 {
        let mut held = Vec::new();
        for _ in 0..3 {
            let s = pool.acquire().await.unwrap();
            assert_eq!(s.generation(), pool.generation());
            held.push(s);
        }
        if round % 4 == 3 {
            pool.reset(ResetReason::Manual).await.unwrap();
        }
        for s in held {
            pool.release(s).await;
        }
        assert!(pool.stats().await.idle <= 2);
    }
    assert_eq!(pool.generation(), 5);
}
