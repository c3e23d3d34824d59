// Copyright 2026 PlaceRank Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session pool and anti-block state machine.
//!
//! The pool is `Active` while it serves sessions of the current generation
//! and `Resetting` while a teardown, cooldown, and relaunch is in progress.
//! Every reset bumps the generation; sessions tagged with an older
//! generation are dropped, never closed one by one and never reused.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::config::PoolConfig;
use crate::renderer::{Launcher, RenderContext, Renderer};

/// Warm-up navigation budget for a fresh session.
const WARMUP_TIMEOUT_MS: u64 = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    Active,
    Resetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetReason {
    /// Consecutive failed fetches reached the threshold.
    FailureThreshold,
    /// A block or challenge page was served.
    HardBlock,
    /// The request budget for one generation was used up.
    SessionLimit,
    Manual,
}

impl std::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailureThreshold => write!(f, "failure threshold"),
            Self::HardBlock => write!(f, "hard block"),
            Self::SessionLimit => write!(f, "session request limit"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Failures the pool cannot absorb.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The backend could not be (re)launched. Fatal for the sweep.
    #[error("failed to launch {backend} backend: {message}")]
    Launch { backend: &'static str, message: String },
    /// A single session could not be opened.
    #[error("failed to open session: {0}")]
    Context(String),
}

impl PoolError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Launch { .. })
    }
}

/// One reusable browsing context, tagged with the generation that made it.
pub struct Session {
    ctx: Box<dyn RenderContext>,
    generation: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("generation", &self.generation).finish_non_exhaustive()
    }
}

impl Session {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn fetch_text(&mut self, url: &str, timeout_ms: u64) -> anyhow::Result<String> {
        self.ctx.fetch_text(url, timeout_ms).await
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub backend: &'static str,
    pub state: PoolState,
    pub generation: u64,
    pub idle: usize,
    pub active_contexts: usize,
    pub consecutive_failures: u32,
    pub requests_since_reset: u32,
    pub resets: u64,
}

pub struct SessionPool {
    launcher: Arc<dyn Launcher>,
    config: PoolConfig,
    warmup_url: Option<String>,
    state: watch::Sender<PoolState>,
    generation: AtomicU64,
    idle: Mutex<Vec<Session>>,
    renderer: RwLock<Option<Arc<dyn Renderer>>>,
    consecutive_failures: AtomicU32,
    requests: AtomicU32,
    resets: AtomicU64,
}

impl SessionPool {
    /// Launch the backend and return an active pool at generation 0.
    pub async fn start(
        launcher: Arc<dyn Launcher>,
        config: PoolConfig,
        warmup_url: Option<String>,
    ) -> Result<Arc<Self>, PoolError> {
        let renderer = launcher.launch().await.map_err(|e| PoolError::Launch {
            backend: launcher.name(),
            message: format!("{e:#}"),
        })?;
        tracing::info!(backend = launcher.name(), "session pool started");
        let (state, _) = watch::channel(PoolState::Active);
        Ok(Arc::new(Self {
            launcher,
            config,
            warmup_url,
            state,
            generation: AtomicU64::new(0),
            idle: Mutex::new(Vec::new()),
            renderer: RwLock::new(Some(renderer)),
            consecutive_failures: AtomicU32::new(0),
            requests: AtomicU32::new(0),
            resets: AtomicU64::new(0),
        }))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<PoolState> {
        self.state.subscribe()
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Session>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn wait_active(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == PoolState::Active).await;
    }

    /// A session of the current generation. Blocks while a reset runs.
    pub async fn acquire(&self) -> Result<Session, PoolError> {
        loop {
            self.wait_active().await;
            let generation = self.generation();

            match self.take_idle(generation) {
                Idle::Reused(session) => return Ok(session),
                Idle::Stale => continue,
                Idle::Empty => {}
            }

            let renderer = self.renderer.read().await.clone();
            let Some(renderer) = renderer else {
                return Err(PoolError::Launch {
                    backend: self.launcher.name(),
                    message: "no backend is running".to_string(),
                });
            };

            let mut ctx = renderer
                .new_context()
                .await
                .map_err(|e| PoolError::Context(format!("{e:#}")))?;
            if let Some(url) = &self.warmup_url {
                if let Err(e) = ctx.navigate(url, WARMUP_TIMEOUT_MS).await {
                    tracing::debug!(error = %e, "session warm-up failed");
                }
            }

            // A reset may have started while the context was being built.
            if self.generation() == generation && self.state() == PoolState::Active {
                tracing::debug!(generation, "opened session");
                return Ok(Session { ctx, generation });
            }
            drop(ctx);
        }
    }

    /// Pop an idle session of `generation`. The state and generation are
    /// read under the idle lock, which a reset holds while it bumps the
    /// generation and empties the list.
    fn take_idle(&self, generation: u64) -> Idle {
        let mut idle = self.idle();
        if self.state() != PoolState::Active || self.generation() != generation {
            return Idle::Stale;
        }
        while let Some(s) = idle.pop() {
            if s.generation == generation {
                return Idle::Reused(s);
            }
        }
        Idle::Empty
    }

    /// Return a session for reuse. Stale sessions are dropped.
    pub async fn release(&self, session: Session) {
        if session.generation != self.generation() || self.state() == PoolState::Resetting {
            return;
        }
        let overflow = {
            let mut idle = self.idle();
            if idle.len() < self.config.max_idle {
                idle.push(session);
                None
            } else {
                Some(session)
            }
        };
        if let Some(session) = overflow {
            let _ = session.ctx.close().await;
        }
    }

    /// Tear down and relaunch the backend. Returns `false` when another
    /// reset is already in flight.
    pub async fn reset(&self, reason: ResetReason) -> Result<bool, PoolError> {
        let started = self.state.send_if_modified(|s| {
            if *s == PoolState::Active {
                *s = PoolState::Resetting;
                true
            } else {
                false
            }
        });
        if !started {
            return Ok(false);
        }
        let _guard = ResetGuard(self);

        // Bulk teardown frees these; closing them one by one races it.
        let (generation, stale) = {
            let mut idle = self.idle();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (generation, std::mem::take(&mut *idle))
        };
        drop(stale);
        tracing::info!(%reason, generation, "resetting session pool");

        let old = self.renderer.write().await.take();
        if let Some(renderer) = old {
            if let Err(e) = renderer.shutdown().await {
                tracing::warn!(error = %e, "backend shutdown failed");
            }
        }

        let cooldown = self.cooldown();
        tracing::info!(cooldown_ms = cooldown.as_millis() as u64, "pool cooldown");
        tokio::time::sleep(cooldown).await;

        let relaunched = self.launcher.launch().await.map_err(|e| PoolError::Launch {
            backend: self.launcher.name(),
            message: format!("{e:#}"),
        })?;
        *self.renderer.write().await = Some(relaunched);
        self.resets.fetch_add(1, Ordering::Relaxed);
        tracing::info!(generation, "session pool ready");
        Ok(true)
    }

    fn cooldown(&self) -> Duration {
        let jitter = if self.config.cooldown_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.cooldown_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.config.cooldown_base_ms + jitter)
    }

    /// Count a request and run periodic or threshold resets before it.
    pub async fn before_request(&self) -> Result<(), PoolError> {
        let served = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if served >= self.config.session_request_limit {
            self.reset(ResetReason::SessionLimit).await?;
        }
        if self.consecutive_failures.load(Ordering::SeqCst) >= self.config.failure_threshold {
            self.reset(ResetReason::FailureThreshold).await?;
        }
        Ok(())
    }

    /// Track consecutive failures; any success clears the run.
    pub fn record_outcome(&self, load_failed: bool) {
        if load_failed {
            let n = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(consecutive_failures = n, "fetch failed");
        } else {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let active_contexts = self
            .renderer
            .read()
            .await
            .as_ref()
            .map(|r| r.active_contexts())
            .unwrap_or(0);
        PoolStats {
            backend: self.launcher.name(),
            state: self.state(),
            generation: self.generation(),
            idle: self.idle().len(),
            active_contexts,
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            requests_since_reset: self.requests.load(Ordering::SeqCst),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }

    /// Close idle sessions and stop the backend.
    pub async fn shutdown(&self) {
        let idle = std::mem::take(&mut *self.idle());
        for session in idle {
            let _ = session.ctx.close().await;
        }
        if let Some(renderer) = self.renderer.write().await.take() {
            if let Err(e) = renderer.shutdown().await {
                tracing::warn!(error = %e, "backend shutdown failed");
            }
        }
    }
}

enum Idle {
    Reused(Session),
    Empty,
    /// A reset began after the caller read the generation.
    Stale,
}

/// Clears counters and returns the pool to `Active` however the reset ends.
struct ResetGuard<'a>(&'a SessionPool);

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        self.0.consecutive_failures.store(0, Ordering::SeqCst);
        self.0.requests.store(0, Ordering::SeqCst);
        self.0.state.send_replace(PoolState::Active);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::http::HttpLauncher;

    fn config() -> PoolConfig {
        PoolConfig {
            max_idle: 2,
            failure_threshold: 3,
            session_request_limit: 1000,
            cooldown_base_ms: 0,
            cooldown_jitter_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_idle_take_rechecks_state_and_generation() {
        let pool = SessionPool::start(Arc::new(HttpLauncher::new(1_000)), config(), None)
            .await
            .unwrap();
        let session = pool.acquire().await.unwrap();
        pool.release(session).await;
        assert_eq!(pool.idle().len(), 1);

        pool.state.send_replace(PoolState::Resetting);
        assert!(matches!(pool.take_idle(0), Idle::Stale));
        pool.state.send_replace(PoolState::Active);

        pool.generation.fetch_add(1, Ordering::SeqCst);
        assert!(matches!(pool.take_idle(0), Idle::Stale));
        assert_eq!(pool.idle().len(), 1);

        // The parked session is from generation 0 and is never reused.
        assert!(matches!(pool.take_idle(1), Idle::Empty));
        let fresh = pool.acquire().await.unwrap();
        assert_eq!(fresh.generation(), 1);
        assert_eq!(format!("{fresh:?}"), "Session { generation: 1, .. }");
    }
}
