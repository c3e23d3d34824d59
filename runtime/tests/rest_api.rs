//! REST API end to end over a fake backend.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_json_diff::assert_json_include;
use serde_json::{json, Value};

use common::{fetch_config, keyword_of, pool_config, results_page, FakeLauncher, TARGET_ID};
use placerank::{MapVariant, Vocabulary};
use placerank_runtime::config::{RuntimeConfig, SweepConfig};
use placerank_runtime::pool::SessionPool;
use placerank_runtime::rest::{router, ServeState};

async fn serve(checkpoints: &std::path::Path) -> SocketAddr {
    let launcher = FakeLauncher::new(|url| match keyword_of(url).as_str() {
        "광안 칼국수" => results_page(Some(2), MapVariant::Current),
        _ => results_page(None, MapVariant::Legacy),
    });
    let config = RuntimeConfig {
        pool: pool_config(),
        fetch: fetch_config("https://m.search.example.test/search.naver"),
        sweep: SweepConfig {
            window_gap_ms: 0,
            retry_initial_delay_ms: 0,
            retry_gap_ms: 0,
            location_filter: false,
            ..SweepConfig::default()
        },
        checkpoint_dir: checkpoints.to_path_buf(),
        ..RuntimeConfig::default()
    };
    let pool = SessionPool::start(launcher, config.pool.clone(), None).await.unwrap();
    let state = ServeState::new(config, Vocabulary::embedded().clone(), pool);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(Arc::clone(&state))).await.unwrap();
    });
    addr
}

fn profile_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": "바다 칼국수",
        "category_code": "food",
        "address": "부산광역시 수영구 광안동",
    })
}

#[tokio::test]
async fn test_health_and_idle_control() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(dir.path()).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let resp = client
        .post(format!("http://{addr}/api/v1/control"))
        .json(&json!({ "action": "stop" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "E_IDLE");

    let resp = client
        .get(format!("http://{addr}/api/v1/sweep/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn test_invalid_profile_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(dir.path()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/sweep"))
        .json(&json!({ "profile": profile_json("not-a-number") }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "E_INVALID_PROFILE");
}

#[tokio::test]
async fn test_sweep_runs_to_report() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(dir.path()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/v1/sweep"))
        .json(&json!({
            "profile": profile_json(TARGET_ID),
            "keywords": ["광안 칼국수", "수영구 맛집", "광안리 점심"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 202);
    let accepted: Value = resp.json().await.unwrap();
    let sweep_id = accepted["sweep_id"].as_str().unwrap().to_string();

    let mut report = None;
    for _ in 0..100 {
        let resp = client
            .get(format!("http://{addr}/api/v1/sweep/{sweep_id}"))
            .send()
            .await
            .unwrap();
        if resp.status().is_success() {
            report = Some(resp.json::<Value>().await.unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let report = report.expect("sweep finished");

    assert_json_include!(
        actual: report,
        expected: json!({
            "sweep_id": sweep_id,
            "business_id": TARGET_ID,
            "checked": 3,
            "hits": [{ "keyword": "광안 칼국수", "rank": 2, "map_variant": "current" }],
            "stopped": false,
        })
    );
    assert!(dir.path().join(format!("{TARGET_ID}.checkpoint.json")).exists());

    let status: Value = client
        .get(format!("http://{addr}/api/v1/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["reports"], 1);
    assert!(status["running"].is_null());
    assert_eq!(status["pool"]["backend"], "fake");
}
