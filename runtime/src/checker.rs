//! Rank checks: one keyword in, one [`MatchOutcome`] out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use url::Url;

use placerank::{BusinessProfile, MatchOutcome, Resolver, Strategy, Target, Vocabulary};

use crate::config::FetchConfig;
use crate::pool::{PoolError, ResetReason, SessionPool};

/// Anything that can rank a keyword for the sweep's business.
///
/// Only fatal pool failures are errors; everything else is an outcome.
#[async_trait]
pub trait RankProbe: Send + Sync {
    async fn check(&self, keyword: &str) -> Result<MatchOutcome, PoolError>;
}

pub struct RankChecker {
    pool: Arc<SessionPool>,
    fetch: FetchConfig,
    search_base: Url,
    resolver: Resolver,
    target: Target,
}

impl RankChecker {
    pub fn new(
        pool: Arc<SessionPool>,
        fetch: FetchConfig,
        vocab: &Vocabulary,
        profile: &BusinessProfile,
    ) -> anyhow::Result<Self> {
        let search_base = Url::parse(&fetch.search_url)
            .with_context(|| format!("invalid search url {:?}", fetch.search_url))?;
        Ok(Self {
            pool,
            fetch,
            search_base,
            resolver: Resolver::new(vocab),
            target: profile.target(),
        })
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// The mobile search URL for `keyword`.
    pub fn search_url(&self, keyword: &str) -> String {
        let mut url = self.search_base.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("sm", "mtb_hty.top")
            .append_pair("where", "m")
            .append_pair("query", keyword);
        url.to_string()
    }

    fn request_delay(&self) -> Duration {
        let jitter = if self.fetch.delay_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.fetch.delay_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.fetch.delay_base_ms + jitter)
    }

    /// One fetch and resolve. Session-level failures become outcomes.
    async fn attempt(&self, keyword: &str) -> Result<MatchOutcome, PoolError> {
        let mut session = match self.pool.acquire().await {
            Ok(s) => s,
            Err(e) if !e.is_fatal() => {
                tracing::debug!(keyword, error = %e, "no session");
                return Ok(MatchOutcome::failed(Strategy::FetchError));
            }
            Err(e) => return Err(e),
        };

        tokio::time::sleep(self.request_delay()).await;
        let url = self.search_url(keyword);
        let fetched = session.fetch_text(&url, self.fetch.timeout_ms).await;
        self.pool.release(session).await;

        match fetched {
            Ok(body) => Ok(self.resolver.resolve(&body, &self.target)),
            Err(e) => {
                tracing::debug!(keyword, error = %e, "fetch failed");
                Ok(MatchOutcome::failed(Strategy::FetchError))
            }
        }
    }
}

#[async_trait]
impl RankProbe for RankChecker {
    async fn check(&self, keyword: &str) -> Result<MatchOutcome, PoolError> {
        self.pool.before_request().await?;

        let mut outcome = self.attempt(keyword).await?;
        if outcome.is_hard_block() {
            tracing::warn!(keyword, "block page served");
            self.pool.reset(ResetReason::HardBlock).await?;
            outcome = self.attempt(keyword).await?;
        } else if outcome.load_failed {
            tokio::time::sleep(Duration::from_millis(self.fetch.transient_retry_delay_ms)).await;
            outcome = self.attempt(keyword).await?;
        }

        self.pool.record_outcome(outcome.load_failed);
        tracing::debug!(
            keyword,
            rank = ?outcome.rank,
            variant = ?outcome.map_variant,
            strategy = %outcome.strategy,
            "checked"
        );
        Ok(outcome)
    }
}
