//! `placerank batch`: several profiles in sequence over one session pool.
//!
//! Skip ends only the current profile; stop (or Ctrl-C) ends the batch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use placerank::{Checkpoint, CheckpointReader};

use crate::cli::output::{self, Styled};
use crate::cli::sweep_cmd::{self, SweepArgs};
use crate::sweep::control::SweepControl;

pub async fn run(profiles: &[PathBuf], resume: bool, args: &SweepArgs) -> Result<()> {
    let config = sweep_cmd::load_config(args)?;
    let vocab = config.vocabulary()?;

    // Fail on a bad profile before anything is launched.
    let loaded = profiles
        .iter()
        .map(|p| sweep_cmd::load_profile(p))
        .collect::<Result<Vec<_>>>()?;

    let pool = sweep_cmd::start_pool(&config).await?;
    let control = SweepControl::new();
    sweep_cmd::stop_on_ctrl_c(control.clone());

    let mut reports = Vec::new();
    let mut failure = None;
    for (i, profile) in loaded.iter().enumerate() {
        if control.snapshot().stop {
            break;
        }
        control.reset_skip();
        tracing::info!(business = %profile.id, task = i + 1, total = loaded.len(), "batch task");

        let checkpoint = if resume {
            let path = Checkpoint::path_in(&config.checkpoint_dir, &profile.id);
            if path.exists() {
                Some(
                    CheckpointReader::read_from_file(&path)
                        .with_context(|| format!("failed to read checkpoint {}", path.display()))?,
                )
            } else {
                None
            }
        } else {
            None
        };

        match sweep_cmd::sweep_profile(&config, &vocab, &pool, profile, checkpoint, args, &control).await {
            Ok(report) => {
                if !output::is_json() {
                    sweep_cmd::print_report(profile, &report);
                }
                reports.push(report);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    pool.shutdown().await;

    if output::is_json() {
        output::print_json(&serde_json::json!({ "reports": reports }));
    } else if !output::is_quiet() {
        let s = Styled::new();
        let hits: usize = reports.iter().map(|r| r.hits.len()).sum();
        eprintln!(
            "  {} batch: {}/{} profiles swept, {hits} hits",
            if failure.is_some() { s.warn_sym() } else { s.ok_sym() },
            reports.len(),
            loaded.len()
        );
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
