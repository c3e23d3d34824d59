//! The browserless backend against a mock search endpoint.

mod common;

use wiremock::matchers::{header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fetch_config, pool_config, profile, results_page};
use placerank::{MapVariant, Vocabulary};
use placerank_runtime::checker::{RankChecker, RankProbe};
use placerank_runtime::pool::SessionPool;
use placerank_runtime::renderer::http::{HttpLauncher, HttpRenderer};
use placerank_runtime::renderer::{RenderContext, Renderer};

#[tokio::test]
async fn test_fetch_presents_mobile_identity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .and(header_regex("user-agent", "iPhone OS 17_4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let renderer = HttpRenderer::new(2_000).unwrap();
    let mut ctx = renderer.new_context().await.unwrap();
    let body = ctx.fetch_text(&format!("{}/page", server.uri()), 2_000).await.unwrap();
    assert_eq!(body, "hello");
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let renderer = HttpRenderer::new(5_000).unwrap();
    let mut ctx = renderer.new_context().await.unwrap();
    let nav = ctx.navigate(&format!("{}/flaky", server.uri()), 5_000).await.unwrap();
    assert_eq!(nav.status, 200);
    assert!(nav.final_url.ends_with("/flaky"));
}

#[tokio::test]
async fn test_client_error_body_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&server)
        .await;

    let renderer = HttpRenderer::new(2_000).unwrap();
    let mut ctx = renderer.new_context().await.unwrap();
    let body = ctx.fetch_text(&server.uri(), 2_000).await.unwrap();
    assert_eq!(body, "missing");
}

#[tokio::test]
async fn test_rank_check_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search.naver"))
        .and(query_param("where", "m"))
        .and(query_param("query", "광안 칼국수"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results_page(Some(3), MapVariant::Current)))
        .mount(&server)
        .await;

    let search = format!("{}/search.naver", server.uri());
    let pool = SessionPool::start(std::sync::Arc::new(HttpLauncher::new(2_000)), pool_config(), None)
        .await
        .unwrap();
    let checker = RankChecker::new(pool, fetch_config(&search), Vocabulary::embedded(), &profile()).unwrap();

    let outcome = checker.check("광안 칼국수").await.unwrap();
    assert_eq!(outcome.rank, Some(3));
    assert_eq!(outcome.map_variant, Some(MapVariant::Current));

    // Unmatched queries get wiremock's empty 404, a transient failure.
    let outcome = checker.check("수영구 수제비").await.unwrap();
    assert!(outcome.load_failed);
}
