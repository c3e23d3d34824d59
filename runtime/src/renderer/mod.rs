//! Session backends for fetching search result payloads.
//!
//! Defines the `Renderer`, `RenderContext` and `Launcher` traits that
//! abstract over the browsing engine (Chromium via chromiumoxide, or a
//! plain reqwest client).

pub mod chromium;
pub mod http;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BackendKind, RuntimeConfig};

/// Mobile Safari identity presented by every backend.
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";

pub const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// A browsing engine that can create session contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new context with identity countermeasures applied.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Tear down the engine and every context it owns.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently open contexts.
    fn active_contexts(&self) -> usize;
}

/// One session context (a browser tab, or a client for the HTTP backend).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Fetch `url` from within the session and return the body text.
    ///
    /// Network failures yield an empty string; the resolver classifies it.
    async fn fetch_text(&mut self, url: &str, timeout_ms: u64) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Builds a fresh renderer. Called at pool start and after every reset.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Renderer>>;
    fn name(&self) -> &'static str;
}

/// The launcher selected by `config.backend`.
pub fn launcher_for(config: &RuntimeConfig) -> Arc<dyn Launcher> {
    match config.backend {
        BackendKind::Chromium => Arc::new(chromium::ChromiumLauncher::new(config.chromium_path.clone())),
        BackendKind::Http => Arc::new(http::HttpLauncher::new(config.fetch.timeout_ms)),
    }
}
