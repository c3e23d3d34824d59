//! Chromium-based backend using chromiumoxide.
//!
//! Every tab is prepared as a mobile Safari on iOS: navigator overrides are
//! injected before any page script runs, and user agent, language headers,
//! viewport, and touch emulation are set through CDP.

use super::{Launcher, NavigationResult, RenderContext, Renderer, ACCEPT_LANGUAGE, MOBILE_USER_AGENT};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const VIEWPORT_WIDTH: i64 = 390;
const VIEWPORT_HEIGHT: i64 = 844;
const DEVICE_SCALE: f64 = 3.0;
const MAX_TOUCH_POINTS: i64 = 5;

/// Injected into every document before page scripts run.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });
Object.defineProperty(navigator, 'languages', { get: () => ['ko-KR', 'ko', 'en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'platform', { get: () => 'iPhone' });
Object.defineProperty(navigator, 'maxTouchPoints', { get: () => 5 });
window.chrome = { runtime: {} };
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
  window.navigator.permissions.query = (parameters) =>
    parameters.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission })
      : originalQuery(parameters);
}
"#;

/// Find the Chromium binary path.
///
/// Checks `explicit` (config), `PLACERANK_CHROMIUM_PATH`, `~/.placerank/chromium/`,
/// the system PATH, then common OS install locations.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        if p.exists() {
            return Some(p.clone());
        }
    }

    if let Ok(p) = std::env::var("PLACERANK_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".placerank/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".placerank/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".placerank/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".placerank/chromium/chrome-linux64/chrome"),
                home.join(".placerank/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let common: &[&str] = if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else {
        &["/usr/bin/google-chrome-stable", "/snap/bin/chromium"]
    };
    common.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Launches a headless Chromium per pool generation.
pub struct ChromiumLauncher {
    path: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        let renderer = ChromiumRenderer::new(self.path.as_ref()).await?;
        Ok(Arc::new(renderer))
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance.
    pub async fn new(path: Option<&PathBuf>) -> Result<Self> {
        let chrome_path = find_chromium(path)
            .context("Chromium not found. Set PLACERANK_CHROMIUM_PATH or `chromium_path` in the config.")?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--lang=ko-KR")
            .window_size(VIEWPORT_WIDTH as u32, VIEWPORT_HEIGHT as u32)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    async fn prepare(page: &Page) -> Result<()> {
        page.evaluate_on_new_document(STEALTH_SCRIPT)
            .await
            .context("failed to install navigator overrides")?;
        page.set_user_agent(MOBILE_USER_AGENT)
            .await
            .context("failed to set user agent")?;

        let headers = Headers::new(serde_json::json!({
            "Accept-Language": ACCEPT_LANGUAGE,
            "Sec-CH-UA-Mobile": "?1",
            "Sec-CH-UA-Platform": "\"iOS\"",
        }));
        page.execute(SetExtraHttpHeadersParams::new(headers))
            .await
            .context("failed to set headers")?;

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(VIEWPORT_WIDTH)
            .height(VIEWPORT_HEIGHT)
            .device_scale_factor(DEVICE_SCALE)
            .mobile(true)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid viewport: {e}"))?;
        page.execute(metrics).await.context("failed to set viewport")?;

        let touch = SetTouchEmulationEnabledParams::builder()
            .enabled(true)
            .max_touch_points(MAX_TOUCH_POINTS)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid touch params: {e}"))?;
        page.execute(touch).await.context("failed to enable touch")?;
        Ok(())
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        if let Err(e) = Self::prepare(&page).await {
            let _ = page.close().await;
            return Err(e);
        }

        self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ChromiumContext {
            page: Some(page),
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        self.handler.abort();
        self.active_count.store(0, Ordering::Relaxed);
        closed.context("failed to close Chromium")?;
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium tab.
pub struct ChromiumContext {
    page: Option<Page>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    fn page(&self) -> Result<&Page> {
        self.page.as_ref().context("context already closed")
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let page = self.page()?;
        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), page.goto(url)).await;
        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());
                Ok(NavigationResult {
                    final_url,
                    status: 200,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn fetch_text(&mut self, url: &str, timeout_ms: u64) -> Result<String> {
        let target = serde_json::to_string(url)?;
        let script = format!(
            "(async () => {{ try {{ const r = await fetch({target}, {{ credentials: 'include' }}); \
             return await r.text(); }} catch (e) {{ return ''; }} }})()"
        );
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid evaluate params: {e}"))?;

        let page = self.page()?;
        let evaluated = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            page.evaluate_expression(params),
        )
        .await;

        match evaluated {
            Ok(Ok(result)) => Ok(result.into_value::<String>().unwrap_or_default()),
            Ok(Err(e)) => bail!("in-page fetch failed: {e}"),
            Err(_) => bail!("in-page fetch timed out after {timeout_ms}ms"),
        }
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if let Some(page) = self.page.take() {
            self.active_count.fetch_sub(1, Ordering::Relaxed);
            let _ = page.close().await;
        }
        Ok(())
    }
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        // Dropped without close(): the tab goes down with the browser.
        if self.page.is_some() {
            self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_must_exist() {
        let missing = PathBuf::from("/nonexistent/placerank/chrome");
        let found = find_chromium(Some(&missing));
        assert_ne!(found.as_ref(), Some(&missing));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_context_fetches_text() {
        let renderer = ChromiumRenderer::new(None)
            .await
            .expect("failed to create renderer");
        let mut ctx = renderer
            .new_context()
            .await
            .expect("failed to create context");
        assert_eq!(renderer.active_contexts(), 1);

        ctx.navigate("data:text/html,<h1>Hello</h1>", 10_000)
            .await
            .expect("navigation failed");
        let body = ctx
            .fetch_text("data:text/plain,hello", 10_000)
            .await
            .expect("fetch failed");
        assert_eq!(body, "hello");

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);
        renderer.shutdown().await.expect("shutdown failed");
    }
}
