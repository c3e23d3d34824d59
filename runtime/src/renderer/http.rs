//! Browserless backend wrapping reqwest.
//!
//! Not a browser, just HTTP requests presenting the same mobile identity.
//! Retries 5xx with exponential backoff and honors `retry-after` on 429.

use super::{Launcher, NavigationResult, RenderContext, Renderer, ACCEPT_LANGUAGE, MOBILE_USER_AGENT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE as ACCEPT_LANGUAGE_HEADER};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_RETRIES: u32 = 2;

/// Builds an [`HttpRenderer`] per pool generation.
pub struct HttpLauncher {
    timeout_ms: u64,
}

impl HttpLauncher {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }
}

#[async_trait]
impl Launcher for HttpLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        Ok(Arc::new(HttpRenderer::new(self.timeout_ms)?))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// A renderer whose contexts share one connection pool.
pub struct HttpRenderer {
    client: reqwest::Client,
    active_count: Arc<AtomicUsize>,
}

impl HttpRenderer {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE_HEADER, HeaderValue::from_static(ACCEPT_LANGUAGE));
        headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?1"));
        headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"iOS\""));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(MOBILE_USER_AGENT)
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(HttpContext {
            client: self.client.clone(),
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.active_count.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

pub struct HttpContext {
    client: reqwest::Client,
    active_count: Arc<AtomicUsize>,
}

impl HttpContext {
    /// GET with retry on 5xx and backoff on 429.
    async fn get(&self, url: &str, timeout_ms: u64) -> Result<(u16, String, String)> {
        let mut retries = 0u32;

        loop {
            let resp = self
                .client
                .get(url)
                .timeout(Duration::from_millis(timeout_ms))
                .send()
                .await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && retries < MAX_RETRIES {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if status == 429 && retries < MAX_RETRIES {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    let final_url = r.url().to_string();
                    let body = r.text().await.unwrap_or_default();
                    return Ok((status, final_url, body));
                }
                Err(e) => {
                    if retries < MAX_RETRIES {
                        retries += 1;
                        let delay = Duration::from_millis(500 * 2u64.pow(retries - 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl RenderContext for HttpContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let (status, final_url, _) = self.get(url, timeout_ms).await?;
        Ok(NavigationResult {
            final_url,
            status,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn fetch_text(&mut self, url: &str, timeout_ms: u64) -> Result<String> {
        let (status, _, body) = self.get(url, timeout_ms).await?;
        if status >= 400 {
            tracing::debug!(status, url, "non-success status from search");
        }
        Ok(body)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}
