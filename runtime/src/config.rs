//! Runtime configuration.
//!
//! Resolved from, in order: an explicit path, `PLACERANK_CONFIG`,
//! `./placerank.json`, `~/.placerank/config.json`, then built-in defaults.
//! `PLACERANK_CHROMIUM_PATH` and `PLACERANK_CHECKPOINT_DIR` override the
//! file afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which browser backend serves sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Headless Chromium with stealth setup.
    #[default]
    Chromium,
    /// Plain HTTP client, no browser.
    Http,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chromium => write!(f, "chromium"),
            Self::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle sessions kept for reuse.
    pub max_idle: usize,
    /// Consecutive failed fetches that force a reset.
    pub failure_threshold: u32,
    /// Requests served before a periodic reset.
    pub session_request_limit: u32,
    pub cooldown_base_ms: u64,
    pub cooldown_jitter_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 6,
            failure_threshold: 12,
            session_request_limit: 300,
            cooldown_base_ms: 5000,
            cooldown_jitter_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub delay_base_ms: u64,
    pub delay_jitter_ms: u64,
    pub timeout_ms: u64,
    pub search_url: String,
    /// Visited once per new session to pick up cookies.
    pub warmup_url: String,
    pub transient_retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            delay_base_ms: 500,
            delay_jitter_ms: 500,
            timeout_ms: 15_000,
            search_url: "https://m.search.naver.com/search.naver".to_string(),
            warmup_url: "https://m.naver.com".to_string(),
            transient_retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Candidates evaluated concurrently per window.
    pub concurrency: usize,
    pub window_gap_ms: u64,
    pub retry_initial_delay_ms: u64,
    pub retry_gap_ms: u64,
    pub retry_capacity: usize,
    /// Write a checkpoint each time the hit count reaches a multiple of this.
    pub autosave_every: usize,
    /// Skip keywords with no location context.
    pub location_filter: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            window_gap_ms: 30,
            retry_initial_delay_ms: 1500,
            retry_gap_ms: 500,
            retry_capacity: 10_000,
            autosave_every: 10,
            location_filter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub pool: PoolConfig,
    pub fetch: FetchConfig,
    pub sweep: SweepConfig,
    pub backend: BackendKind,
    pub chromium_path: Option<PathBuf>,
    pub checkpoint_dir: PathBuf,
    /// Replaces the embedded vocabulary when set.
    pub vocabulary_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            fetch: FetchConfig::default(),
            sweep: SweepConfig::default(),
            backend: BackendKind::default(),
            chromium_path: None,
            checkpoint_dir: default_checkpoint_dir(),
            vocabulary_path: None,
        }
    }
}

/// `~/.placerank/checkpoints`, or `./checkpoints` without a home directory.
pub fn default_checkpoint_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".placerank/checkpoints"))
        .unwrap_or_else(|| PathBuf::from("checkpoints"))
}

impl RuntimeConfig {
    /// Load using the resolution order in the module docs.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = match Self::locate(explicit) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        if let Ok(p) = std::env::var("PLACERANK_CONFIG") {
            if !p.trim().is_empty() {
                return Some(PathBuf::from(p));
            }
        }
        let local = PathBuf::from("placerank.json");
        if local.exists() {
            return Some(local);
        }
        dirs::home_dir()
            .map(|h| h.join(".placerank/config.json"))
            .filter(|p| p.exists())
    }

    fn apply_env(&mut self) {
        if let Ok(p) = std::env::var("PLACERANK_CHROMIUM_PATH") {
            if !p.trim().is_empty() {
                self.chromium_path = Some(PathBuf::from(p));
            }
        }
        if let Ok(p) = std::env::var("PLACERANK_CHECKPOINT_DIR") {
            if !p.trim().is_empty() {
                self.checkpoint_dir = PathBuf::from(p);
            }
        }
    }

    /// The embedded vocabulary, or the configured override.
    pub fn vocabulary(&self) -> Result<placerank::Vocabulary> {
        match &self.vocabulary_path {
            Some(path) => placerank::Vocabulary::from_path(path)
                .with_context(|| format!("failed to load vocabulary {}", path.display())),
            None => Ok(placerank::Vocabulary::embedded().clone()),
        }
    }
}
