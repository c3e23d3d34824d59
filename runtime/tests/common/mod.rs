//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use placerank::{BusinessProfile, MapVariant, MatchOutcome};
use placerank_runtime::checker::RankProbe;
use placerank_runtime::config::{FetchConfig, PoolConfig};
use placerank_runtime::pool::PoolError;
use placerank_runtime::renderer::{Launcher, NavigationResult, RenderContext, Renderer};
use placerank_runtime::sweep::control::SweepControl;

pub const TARGET_ID: &str = "1234567";

pub fn profile() -> BusinessProfile {
    BusinessProfile {
        id: TARGET_ID.into(),
        name: "바다 칼국수".into(),
        category_code: "food".into(),
        address: "부산광역시 수영구 광안동".into(),
        services: vec!["칼국수".into(), "수제비".into()],
        ..Default::default()
    }
}

pub fn pool_config() -> PoolConfig {
    PoolConfig {
        max_idle: 2,
        failure_threshold: 3,
        session_request_limit: 1_000,
        cooldown_base_ms: 0,
        cooldown_jitter_ms: 0,
    }
}

pub fn fetch_config(search_url: &str) -> FetchConfig {
    FetchConfig {
        delay_base_ms: 0,
        delay_jitter_ms: 0,
        timeout_ms: 2_000,
        search_url: search_url.to_string(),
        warmup_url: "https://m.example.test".to_string(),
        transient_retry_delay_ms: 0,
    }
}

fn pad(body: &str, to: usize) -> String {
    let mut s = String::from("<html><body>");
    s.push_str(body);
    while s.len() < to {
        s.push_str("<p>filler text</p>");
    }
    s.push_str("</body></html>");
    s
}

/// A results page listing four places, the target at `rank` when given.
pub fn results_page(rank: Option<usize>, variant: MapVariant) -> String {
    let mut items: Vec<String> = (0..4)
        .map(|i| format!(r#"{{"id":"{}","name":"다른 식당 {i}"}}"#, 2_000_001 + i))
        .collect();
    if let Some(r) = rank {
        items.insert(r - 1, format!(r#"{{"id":"{TARGET_ID}","name":"바다 칼국수"}}"#));
    }
    let marker = match variant {
        MapVariant::Current => r#"<div class="place_filter">filters</div>"#,
        MapVariant::Legacy => "",
    };
    let body = format!(
        r#"{marker}<script>window.__skt_view_payload__ = {{"list":[{}]}};</script>"#,
        items.join(",")
    );
    pad(&body, 3_500)
}

pub fn block_page() -> String {
    pad("<div>비정상적인 접근이 감지되었습니다. 보안문자를 입력해 주세요.</div>", 2_000)
}

/// The `query` parameter of a search URL.
pub fn keyword_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.query_pairs().find(|(k, _)| k == "query").map(|(_, v)| v.into_owned()))
        .unwrap_or_default()
}

pub type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Launcher whose renderers answer every fetch through `responder`.
pub struct FakeLauncher {
    responder: Responder,
    pub launches: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
    /// Launches beyond this count fail.
    pub max_launches: Option<usize>,
}

impl FakeLauncher {
    pub fn new(responder: impl Fn(&str) -> String + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Arc::new(responder),
            launches: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            max_launches: None,
        })
    }

    pub fn limited(responder: impl Fn(&str) -> String + Send + Sync + 'static, max: usize) -> Arc<Self> {
        Arc::new(Self {
            responder: Arc::new(responder),
            launches: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            max_launches: Some(max),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_launches.is_some_and(|max| n > max) {
            anyhow::bail!("launch {n} refused");
        }
        Ok(Arc::new(FakeRenderer {
            responder: Arc::clone(&self.responder),
            active: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::clone(&self.shutdowns),
        }))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub struct FakeRenderer {
    responder: Responder,
    active: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            responder: Arc::clone(&self.responder),
            active: Arc::clone(&self.active),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct FakeContext {
    responder: Responder,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        Ok(NavigationResult {
            final_url: url.to_string(),
            status: 200,
            load_time_ms: 0,
        })
    }

    async fn fetch_text(&mut self, url: &str, _timeout_ms: u64) -> Result<String> {
        Ok((self.responder)(url))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scripted probe: each keyword maps to a fixed outcome, misses otherwise.
pub struct ScriptedProbe {
    outcomes: HashMap<String, MatchOutcome>,
    /// Keywords that fail on their first attempt only.
    flaky: Mutex<HashMap<String, usize>>,
    /// Keywords that make the probe fail fatally.
    fatal: Vec<String>,
    pub calls: AtomicUsize,
    /// Request stop on `control` after this many calls.
    stop_after: Option<(usize, SweepControl)>,
}

impl ScriptedProbe {
    pub fn new(outcomes: impl IntoIterator<Item = (&'static str, MatchOutcome)>) -> Self {
        Self {
            outcomes: outcomes.into_iter().map(|(k, o)| (k.to_string(), o)).collect(),
            flaky: Mutex::new(HashMap::new()),
            fatal: Vec::new(),
            calls: AtomicUsize::new(0),
            stop_after: None,
        }
    }

    pub fn flaky(self, keyword: &str) -> Self {
        self.flaky.lock().unwrap().insert(keyword.to_string(), 1);
        self
    }

    pub fn fatal_on(mut self, keyword: &str) -> Self {
        self.fatal.push(keyword.to_string());
        self
    }

    pub fn stop_after(mut self, calls: usize, control: SweepControl) -> Self {
        self.stop_after = Some((calls, control));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RankProbe for ScriptedProbe {
    async fn check(&self, keyword: &str) -> Result<MatchOutcome, PoolError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, control)) = &self.stop_after {
            if n >= *limit {
                control.stop();
            }
        }
        if self.fatal.iter().any(|k| k == keyword) {
            return Err(PoolError::Launch {
                backend: "fake",
                message: "browser gone".to_string(),
            });
        }
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(left) = flaky.get_mut(keyword) {
                if *left > 0 {
                    *left -= 1;
                    return Ok(MatchOutcome::failed(placerank::Strategy::EmptyPayload));
                }
            }
        }
        Ok(self
            .outcomes
            .get(keyword)
            .cloned()
            .unwrap_or_else(|| MatchOutcome::miss(placerank::Strategy::SktPayload, Some(MapVariant::Legacy))))
    }
}
