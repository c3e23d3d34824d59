//! `placerank sweep`: one profile, with a live progress bar.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_stream::wrappers::BroadcastStream;

use placerank::{BusinessProfile, Checkpoint, CheckpointReader, MapVariant, Vocabulary};

use crate::checker::RankChecker;
use crate::cli::output::{self, Styled};
use crate::config::{BackendKind, RuntimeConfig};
use crate::pool::SessionPool;
use crate::progress::{self, ProgressEventKind, ProgressReceiver};
use crate::renderer;
use crate::sweep::control::SweepControl;
use crate::sweep::{self, Sweep, SweepOptions, SweepReport};

/// Options shared by `sweep` and `batch`.
#[derive(Debug, Clone, Default)]
pub struct SweepArgs {
    pub config: Option<PathBuf>,
    pub keywords: Option<PathBuf>,
    pub budget: Option<usize>,
    pub prefer: Option<MapVariant>,
    pub target: Option<usize>,
    pub backend: Option<BackendKind>,
    pub no_filter: bool,
}

pub async fn run(profile_path: &Path, resume: Option<&Path>, args: &SweepArgs) -> Result<()> {
    let config = load_config(args)?;
    let vocab = config.vocabulary()?;
    let profile = load_profile(profile_path)?;
    let checkpoint = resume
        .map(|p| {
            CheckpointReader::read_from_file(p)
                .with_context(|| format!("failed to read checkpoint {}", p.display()))
        })
        .transpose()?;

    let pool = start_pool(&config).await?;
    let control = SweepControl::new();
    stop_on_ctrl_c(control.clone());

    let result = sweep_profile(&config, &vocab, &pool, &profile, checkpoint, args, &control).await;
    pool.shutdown().await;
    let report = result?;
    print_report(&profile, &report);
    Ok(())
}

pub fn load_config(args: &SweepArgs) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if args.no_filter {
        config.sweep.location_filter = false;
    }
    Ok(config)
}

pub fn load_profile(path: &Path) -> Result<BusinessProfile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile {}", path.display()))?;
    let profile: BusinessProfile = serde_json::from_str(&text)
        .with_context(|| format!("invalid profile {}", path.display()))?;
    profile.validate()?;
    Ok(profile)
}

/// One keyword per line; blank lines and `#` comments are skipped.
pub fn load_keywords(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read keywords {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

pub async fn start_pool(config: &RuntimeConfig) -> Result<Arc<SessionPool>> {
    let launcher = renderer::launcher_for(config);
    let warmup = (config.backend == BackendKind::Chromium).then(|| config.fetch.warmup_url.clone());
    let pool = SessionPool::start(launcher, config.pool.clone(), warmup).await?;
    Ok(pool)
}

pub fn stop_on_ctrl_c(control: SweepControl) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if !output::is_quiet() {
                eprintln!("\n  Stopping after the current window...");
            }
            control.stop();
        }
    });
}

/// Run one profile against an already started pool.
pub async fn sweep_profile(
    config: &RuntimeConfig,
    vocab: &Vocabulary,
    pool: &Arc<SessionPool>,
    profile: &BusinessProfile,
    checkpoint: Option<Checkpoint>,
    args: &SweepArgs,
    control: &SweepControl,
) -> Result<SweepReport> {
    let keywords = args.keywords.as_deref().map(load_keywords).transpose()?;
    let (state, supply) = sweep::prepare(
        profile,
        vocab,
        keywords,
        args.budget,
        checkpoint,
        config.sweep.retry_capacity,
    )?;
    let checker = RankChecker::new(Arc::clone(pool), config.fetch.clone(), vocab, profile)?;

    let mut options = SweepOptions::from_config(&config.sweep, Some(config.checkpoint_dir.clone()));
    options.preferred = args.prefer.unwrap_or(MapVariant::Current);
    options.target_hits = args.target;

    let show_bar = !output::is_quiet() && !output::is_json();
    let (tx, rx) = progress::channel();
    let bar = show_bar.then(|| spawn_progress_bar(rx, supply.remaining_len(), &profile.name));

    let sweep = Sweep {
        id: uuid::Uuid::new_v4().to_string(),
        profile,
        vocab,
        probe: &checker,
        options: &options,
        control,
        progress: show_bar.then_some(tx),
    };
    let result = sweep.run(supply, state).await;
    drop(sweep);
    if let Some(handle) = bar {
        let _ = handle.await;
    }
    result
}

fn spawn_progress_bar(
    rx: ProgressReceiver,
    len: Option<usize>,
    name: &str,
) -> tokio::task::JoinHandle<()> {
    let pb = match len {
        Some(n) => {
            let pb = ProgressBar::new(n as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("=> "));
            }
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{prefix} {spinner} [{elapsed_precise}] {pos} {msg}") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb
        }
    };
    pb.set_prefix(name.to_string());

    tokio::spawn(async move {
        let mut events = BroadcastStream::new(rx);
        while let Some(item) = events.next().await {
            let Ok(event) = item else { continue };
            match event.event {
                ProgressEventKind::CandidateChecked { keyword, hit_count, .. } => {
                    pb.inc(1);
                    pb.set_message(format!("{hit_count} hits | {keyword}"));
                }
                ProgressEventKind::Filtered { skipped, .. } => {
                    if let Some(len) = pb.length() {
                        pb.set_length(len.saturating_sub(skipped as u64));
                    }
                }
                ProgressEventKind::RetryPass { queued } => {
                    if pb.length().is_some() {
                        pb.inc_length(queued as u64);
                    }
                    pb.println(format!("  retrying {queued} failed keywords"));
                }
                ProgressEventKind::Warning { message } => pb.println(format!("  ! {message}")),
                ProgressEventKind::SweepFinished { .. } => break,
                ProgressEventKind::SweepStarted { .. } | ProgressEventKind::CheckpointSaved { .. } => {}
            }
        }
        pb.finish_and_clear();
    })
}

pub fn print_report(profile: &BusinessProfile, report: &SweepReport) {
    if output::is_json() {
        output::print_json(&serde_json::to_value(report).unwrap_or_default());
        return;
    }
    if output::is_quiet() {
        return;
    }

    let s = Styled::new();
    let status = if report.stopped {
        "stopped"
    } else if report.skipped {
        "skipped"
    } else if report.target_reached {
        "target reached"
    } else {
        "complete"
    };
    eprintln!(
        "  {} {} ({}): {} hits from {} checks, {status}",
        s.ok_sym(),
        s.bold(&profile.name),
        profile.id,
        report.hits.len(),
        report.checked,
    );
    eprintln!(
        "     current {} | legacy {} | filtered {} | remaining {}",
        report.current_hits,
        report.legacy_hits,
        report.filtered,
        report.remaining.len()
    );
    if let Some(path) = &report.checkpoint_path {
        eprintln!("     {}", s.dim(&format!("checkpoint: {}", path.display())));
    }
    for hit in &report.hits {
        println!("{}\t{}\t{}", hit.rank, hit.map_variant, hit.keyword);
    }
}
