//! Sweep scheduler.
//!
//! Draws candidates in fixed-size windows, checks each window concurrently,
//! then folds the outcomes into [`SweepState`] in dispatch order. Failed
//! loads are retried once, serially, after the main pass. The unconsumed
//! remainder is checkpointed so a later sweep can resume.

pub mod control;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use placerank::generator::location::{LocationFilter, LocationTokens};
use placerank::{
    BusinessProfile, CandidateSupply, Checkpoint, CheckpointWriter, GeneratorCursor, Hit,
    MapVariant, MatchOutcome, SweepState, Vocabulary,
};

use crate::checker::RankProbe;
use crate::config::SweepConfig;
use crate::progress::{emit, ProgressEventKind, ProgressSender};
use control::SweepControl;

/// Batches drawn from a generated supply before giving up on a window
/// whose keywords are all rejected by the location filter.
const MAX_FILTERED_DRAWS: usize = 64;

/// Keywords shown in a `Filtered` event.
const FILTERED_SAMPLE: usize = 5;

#[derive(Debug, Clone)]
pub struct SweepOptions {
    pub preferred: MapVariant,
    /// Stop once this many hits over `preferred` are collected.
    pub target_hits: Option<usize>,
    pub concurrency: usize,
    pub window_gap_ms: u64,
    pub retry_initial_delay_ms: u64,
    pub retry_gap_ms: u64,
    pub autosave_every: usize,
    pub location_filter: bool,
    /// Where checkpoints go; `None` disables them.
    pub checkpoint_dir: Option<PathBuf>,
}

impl SweepOptions {
    pub fn from_config(config: &SweepConfig, checkpoint_dir: Option<PathBuf>) -> Self {
        Self {
            preferred: MapVariant::Current,
            target_hits: None,
            concurrency: config.concurrency.max(1),
            window_gap_ms: config.window_gap_ms,
            retry_initial_delay_ms: config.retry_initial_delay_ms,
            retry_gap_ms: config.retry_gap_ms,
            autosave_every: config.autosave_every,
            location_filter: config.location_filter,
            checkpoint_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub sweep_id: String,
    pub business_id: String,
    /// Sorted by rank, then current before legacy, then discovery order.
    pub hits: Vec<Hit>,
    pub checked: u64,
    /// Unconsumed keywords, followed by failed keywords never retried.
    pub remaining: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorCursor>,
    pub stopped: bool,
    pub skipped: bool,
    pub target_reached: bool,
    pub current_hits: usize,
    pub legacy_hits: usize,
    pub filtered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_path: Option<PathBuf>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// One sweep over one business profile.
pub struct Sweep<'a> {
    pub id: String,
    pub profile: &'a BusinessProfile,
    pub vocab: &'a Vocabulary,
    pub probe: &'a dyn RankProbe,
    pub options: &'a SweepOptions,
    pub control: &'a SweepControl,
    pub progress: Option<ProgressSender>,
}

/// Mutable bookkeeping for one run.
struct Run {
    state: SweepState,
    supply: CandidateSupply,
    seq: u64,
    filtered: usize,
    next_autosave: usize,
    checkpoint_path: Option<PathBuf>,
}

impl Sweep<'_> {
    /// Drive the sweep to exhaustion, stop, skip, or the target.
    ///
    /// Only a fatal pool failure is an error; a checkpoint is written first.
    pub async fn run(&self, supply: CandidateSupply, state: SweepState) -> anyhow::Result<SweepReport> {
        let started = Instant::now();
        let opts = self.options;
        let every = opts.autosave_every;
        let mut run = Run {
            next_autosave: next_multiple(state.hit_count(), every),
            state,
            supply,
            seq: 0,
            filtered: 0,
            checkpoint_path: None,
        };

        tracing::info!(
            sweep = %self.id,
            business = %self.profile.id,
            remaining = ?run.supply.remaining_len(),
            "sweep started"
        );
        emit(
            &self.progress,
            &self.id,
            &mut run.seq,
            ProgressEventKind::SweepStarted {
                business_id: self.profile.id.clone(),
                business_name: self.profile.name.clone(),
                remaining: run.supply.remaining_len(),
                resumed_hits: run.state.hit_count(),
            },
        );

        let filter = opts.location_filter.then(|| {
            let tokens = LocationTokens::derive(&self.profile.address, &self.profile.name, self.vocab);
            LocationFilter::new(self.vocab, &tokens, &self.profile.name)
        });
        if let Some(filter) = &filter {
            let dropped = run.supply.retain(|k| filter.allows(k));
            self.report_filtered(&mut run, dropped);
        }

        let mut stopped = false;
        let mut skipped = false;

        // ── Main pass ──
        loop {
            let ctl = self.control.snapshot();
            if ctl.stop {
                stopped = true;
                break;
            }
            if ctl.skip {
                skipped = true;
                break;
            }
            if self.target_reached(&run.state) {
                break;
            }
            if ctl.paused {
                tracing::info!(sweep = %self.id, "sweep paused");
                self.control.wait_while_paused().await;
                continue;
            }

            let window = self.draw(&mut run, filter.as_ref());
            if window.is_empty() {
                break;
            }

            let outcomes = join_all(window.iter().map(|k| self.probe.check(k))).await;

            let mut fatal = None;
            let mut unprocessed = Vec::new();
            for (keyword, result) in window.iter().zip(outcomes) {
                match result {
                    Ok(outcome) => self.process(&mut run, keyword, &outcome, true),
                    Err(e) => {
                        unprocessed.push(keyword.clone());
                        fatal.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = fatal {
                self.save_checkpoint(&mut run, &unprocessed);
                return Err(anyhow::Error::new(e).context("sweep aborted"));
            }

            self.autosave(&mut run);
            tokio::time::sleep(Duration::from_millis(opts.window_gap_ms)).await;
        }

        // ── Retry pass ──
        let retries = run.state.take_retries();
        if !retries.is_empty() {
            if stopped || skipped || self.target_reached(&run.state) {
                run.state.requeue_retries(retries);
            } else {
                self.retry_pass(&mut run, retries).await?;
                let ctl = self.control.snapshot();
                stopped |= ctl.stop;
                skipped |= ctl.skip && !stopped;
            }
        }

        self.save_checkpoint(&mut run, &[]);

        let mut remaining = run.supply.remainder();
        for k in run.state.retry_queue().to_vec() {
            if !remaining.contains(&k) {
                remaining.push(k);
            }
        }
        let target_reached = self.target_reached(&run.state);
        let report = SweepReport {
            sweep_id: self.id.clone(),
            business_id: self.profile.id.clone(),
            hits: run.state.sorted_hits(),
            checked: run.state.checked(),
            remaining,
            generator: run.supply.cursor(),
            stopped,
            skipped,
            target_reached,
            current_hits: run.state.count_for(MapVariant::Current),
            legacy_hits: run.state.count_for(MapVariant::Legacy),
            filtered: run.filtered,
            checkpoint_path: run.checkpoint_path.clone(),
            finished_at: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            sweep = %self.id,
            checked = report.checked,
            hits = report.hits.len(),
            stopped,
            skipped,
            target_reached,
            "sweep finished"
        );
        emit(
            &self.progress,
            &self.id,
            &mut run.seq,
            ProgressEventKind::SweepFinished {
                checked: report.checked,
                hits: report.hits.clone(),
                remaining: report.remaining.len(),
                stopped,
                skipped,
                target_reached,
                elapsed_ms: report.elapsed_ms,
            },
        );
        Ok(report)
    }

    async fn retry_pass(&self, run: &mut Run, retries: Vec<String>) -> anyhow::Result<()> {
        let opts = self.options;
        tracing::info!(sweep = %self.id, queued = retries.len(), "retry pass");
        emit(
            &self.progress,
            &self.id,
            &mut run.seq,
            ProgressEventKind::RetryPass { queued: retries.len() },
        );
        tokio::time::sleep(Duration::from_millis(opts.retry_initial_delay_ms)).await;

        let mut queue = retries.into_iter();
        while let Some(keyword) = queue.next() {
            self.control.wait_while_paused().await;
            if self.control.snapshot().ends_sweep() || self.target_reached(&run.state) {
                run.state.requeue_retries(std::iter::once(keyword).chain(queue));
                break;
            }

            match self.probe.check(&keyword).await {
                Ok(outcome) => self.process(run, &keyword, &outcome, false),
                Err(e) => {
                    run.state.requeue_retries(std::iter::once(keyword).chain(queue));
                    self.save_checkpoint(run, &[]);
                    return Err(anyhow::Error::new(e).context("sweep aborted during retry pass"));
                }
            }
            self.autosave(run);
            tokio::time::sleep(Duration::from_millis(opts.retry_gap_ms)).await;
        }
        Ok(())
    }

    /// Up to `concurrency` keywords that pass the location filter.
    fn draw(&self, run: &mut Run, filter: Option<&LocationFilter>) -> Vec<String> {
        let want = self.options.concurrency.max(1);
        let Some(filter) = filter else {
            return run.supply.next_batch(want);
        };
        // Fixed supplies were filtered up front.
        if matches!(run.supply, CandidateSupply::Fixed(_)) {
            return run.supply.next_batch(want);
        }

        let mut window = Vec::with_capacity(want);
        let mut dropped = Vec::new();
        for _ in 0..MAX_FILTERED_DRAWS {
            let batch = run.supply.next_batch(want - window.len());
            if batch.is_empty() {
                break;
            }
            for k in batch {
                if filter.allows(&k) {
                    window.push(k);
                } else {
                    dropped.push(k);
                }
            }
            if window.len() >= want {
                break;
            }
        }
        self.report_filtered(run, dropped);
        window
    }

    fn report_filtered(&self, run: &mut Run, dropped: Vec<String>) {
        if dropped.is_empty() {
            return;
        }
        run.filtered += dropped.len();
        tracing::debug!(skipped = dropped.len(), "keywords without location context");
        emit(
            &self.progress,
            &self.id,
            &mut run.seq,
            ProgressEventKind::Filtered {
                skipped: dropped.len(),
                total_skipped: run.filtered,
                sample: dropped.into_iter().take(FILTERED_SAMPLE).collect(),
            },
        );
    }

    fn process(&self, run: &mut Run, keyword: &str, outcome: &MatchOutcome, allow_retry: bool) {
        let recorded = run.state.record(keyword, outcome, allow_retry);
        if let Some(hit) = &recorded.new_hit {
            tracing::info!(
                keyword = %hit.keyword,
                rank = hit.rank,
                variant = %hit.map_variant,
                "hit"
            );
        }
        emit(
            &self.progress,
            &self.id,
            &mut run.seq,
            ProgressEventKind::CandidateChecked {
                checked: run.state.checked(),
                keyword: keyword.to_string(),
                rank: outcome.rank,
                map_variant: outcome.map_variant,
                load_failed: outcome.load_failed,
                new_hit: recorded.new_hit.is_some(),
                hit_count: run.state.hit_count(),
                current_hits: run.state.count_for(MapVariant::Current),
                legacy_hits: run.state.count_for(MapVariant::Legacy),
                target_reached: self.target_reached(&run.state),
                remaining: run.supply.remaining_len(),
            },
        );
    }

    fn autosave(&self, run: &mut Run) {
        let every = self.options.autosave_every;
        if every == 0 || run.state.hit_count() < run.next_autosave {
            return;
        }
        run.next_autosave = next_multiple(run.state.hit_count(), every);
        self.save_checkpoint(run, &[]);
    }

    fn save_checkpoint(&self, run: &mut Run, in_flight: &[String]) {
        let Some(dir) = &self.options.checkpoint_dir else {
            return;
        };
        let checkpoint = Checkpoint::capture(self.profile, &run.state, &run.supply, in_flight);
        let path = Checkpoint::path_in(dir, &self.profile.id);
        let written = CheckpointWriter::write_to_file(&checkpoint, &path)
            .with_context(|| format!("failed to write checkpoint {}", path.display()));
        match written {
            Ok(()) => {
                tracing::info!(path = %path.display(), hits = checkpoint.hits.len(), "checkpoint saved");
                emit(
                    &self.progress,
                    &self.id,
                    &mut run.seq,
                    ProgressEventKind::CheckpointSaved {
                        path: path.clone(),
                        hits: checkpoint.hits.len(),
                    },
                );
                run.checkpoint_path = Some(path);
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "checkpoint not saved");
                emit(
                    &self.progress,
                    &self.id,
                    &mut run.seq,
                    ProgressEventKind::Warning {
                        message: format!("{e:#}"),
                    },
                );
            }
        }
    }

    fn target_reached(&self, state: &SweepState) -> bool {
        state.target_reached(self.options.preferred, self.options.target_hits)
    }
}

/// Starting state and supply: a checkpoint when given, else an explicit
/// keyword list, else a generator capped at `budget`.
pub fn prepare(
    profile: &BusinessProfile,
    vocab: &Vocabulary,
    keywords: Option<Vec<String>>,
    budget: Option<usize>,
    checkpoint: Option<Checkpoint>,
    retry_capacity: usize,
) -> anyhow::Result<(SweepState, CandidateSupply)> {
    profile.validate()?;
    if let Some(cp) = checkpoint {
        tracing::info!(
            business = %cp.business_id,
            hits = cp.hits.len(),
            remaining = cp.remaining.len(),
            "resuming from checkpoint"
        );
        return Ok(cp.into_resume(profile, vocab, retry_capacity)?);
    }
    let supply = match keywords {
        Some(list) => CandidateSupply::fixed(list),
        None => CandidateSupply::generated(placerank::CandidateGenerator::new(profile, vocab), budget),
    };
    Ok((SweepState::new(retry_capacity), supply))
}

/// The smallest multiple of `every` above `count`.
fn next_multiple(count: usize, every: usize) -> usize {
    if every == 0 {
        return usize::MAX;
    }
    (count / every + 1) * every
}
