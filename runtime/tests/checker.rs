//! Rank checks through a fake backend: URL shape, block handling, retries.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{block_page, fetch_config, keyword_of, pool_config, profile, results_page, FakeLauncher};
use placerank::{MapVariant, MatchMethod, Strategy, Vocabulary};
use placerank_runtime::checker::{RankChecker, RankProbe};
use placerank_runtime::pool::SessionPool;

const SEARCH: &str = "https://m.search.example.test/search.naver";

async fn checker_for(launcher: Arc<FakeLauncher>) -> RankChecker {
    let pool = SessionPool::start(launcher, pool_config(), None).await.unwrap();
    RankChecker::new(pool, fetch_config(SEARCH), Vocabulary::embedded(), &profile()).unwrap()
}

#[tokio::test]
async fn test_search_url_carries_keyword() {
    let checker = checker_for(FakeLauncher::new(|_| String::new())).await;
    let url = checker.search_url("수영구 칼국수 맛집");
    assert!(url.starts_with(SEARCH));
    assert!(url.contains("where=m"));
    assert!(url.contains("sm=mtb_hty.top"));
    assert_eq!(keyword_of(&url), "수영구 칼국수 맛집");
}

#[tokio::test]
async fn test_rank_and_variant_from_page() {
    let launcher = FakeLauncher::new(|url| match keyword_of(url).as_str() {
        "광안 칼국수" => results_page(Some(2), MapVariant::Current),
        "수영구 수제비" => results_page(Some(4), MapVariant::Legacy),
        _ => results_page(None, MapVariant::Current),
    });
    let checker = checker_for(launcher).await;

    let o = checker.check("광안 칼국수").await.unwrap();
    assert_eq!(o.rank, Some(2));
    assert_eq!(o.map_variant, Some(MapVariant::Current));
    assert_eq!(o.strategy, Strategy::SktPayload);
    assert_eq!(o.method, Some(MatchMethod::Id));

    let o = checker.check("수영구 수제비").await.unwrap();
    assert_eq!(o.rank, Some(4));
    assert_eq!(o.map_variant, Some(MapVariant::Legacy));

    let o = checker.check("광안 맛집").await.unwrap();
    assert!(!o.load_failed);
    assert_eq!(o.rank, None);
    assert_eq!(o.map_variant, Some(MapVariant::Current));
}

#[tokio::test]
async fn test_block_page_resets_pool_and_retries() {
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);
    let launcher = FakeLauncher::new(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            block_page()
        } else {
            results_page(Some(1), MapVariant::Current)
        }
    });
    let checker = checker_for(launcher.clone()).await;

    let o = checker.check("광안 칼국수").await.unwrap();
    assert_eq!(o.rank, Some(1));
    assert_eq!(served.load(Ordering::SeqCst), 2);
    assert_eq!(launcher.launches(), 2);
    assert_eq!(checker.pool().generation(), 1);
}

#[tokio::test]
async fn test_transient_failure_retries_without_reset() {
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);
    let launcher = FakeLauncher::new(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            String::new()
        } else {
            results_page(Some(3), MapVariant::Legacy)
        }
    });
    let checker = checker_for(launcher.clone()).await;

    let o = checker.check("광안 칼국수").await.unwrap();
    assert_eq!(o.rank, Some(3));
    assert_eq!(launcher.launches(), 1);
    assert_eq!(checker.pool().stats().await.consecutive_failures, 0);
}

#[tokio::test]
async fn test_repeated_failures_reset_before_next_request() {
    let launcher = FakeLauncher::new(|_| String::new());
    let checker = checker_for(launcher.clone()).await;

    for _ in 0..3 {
        let o = checker.check("광안 칼국수").await.unwrap();
        assert!(o.load_failed);
        assert_eq!(o.strategy, Strategy::EmptyPayload);
    }
    assert_eq!(checker.pool().generation(), 0);

    checker.check("광안 칼국수").await.unwrap();
    assert_eq!(checker.pool().generation(), 1);
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn test_fatal_relaunch_surfaces_as_error() {
    let launcher = FakeLauncher::limited(|_| block_page(), 1);
    let checker = checker_for(launcher).await;

    let err = checker.check("광안 칼국수").await.unwrap_err();
    assert!(err.is_fatal());
}
