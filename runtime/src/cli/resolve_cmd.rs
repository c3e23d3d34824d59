//! `placerank resolve`: run the resolver over a saved payload offline.

use std::path::Path;

use anyhow::{Context, Result};
use placerank::{Resolver, Target};

use crate::cli::output::{self, Styled};
use crate::config::RuntimeConfig;

pub async fn run(
    config: Option<&Path>,
    payload_path: &Path,
    id: &str,
    name: &str,
    address: Option<&str>,
) -> Result<()> {
    let config = RuntimeConfig::load(config)?;
    let vocab = config.vocabulary()?;
    let payload = std::fs::read_to_string(payload_path)
        .with_context(|| format!("failed to read payload {}", payload_path.display()))?;

    let target = Target::new(id, name, address.unwrap_or_default());
    let outcome = Resolver::new(&vocab).resolve(&payload, &target);

    if output::is_json() || output::is_quiet() {
        output::print_json(&serde_json::to_value(&outcome)?);
        return Ok(());
    }

    let s = Styled::new();
    match (outcome.rank, outcome.map_variant) {
        (Some(rank), Some(variant)) => eprintln!(
            "  {} rank {rank} ({variant}) via {} [{:?}]",
            s.ok_sym(),
            outcome.strategy,
            outcome.method
        ),
        _ if outcome.load_failed => eprintln!(
            "  {} load failed: {}",
            s.warn_sym(),
            outcome.strategy
        ),
        _ => eprintln!(
            "  {} not in the top 5 ({}, {})",
            s.warn_sym(),
            outcome.strategy,
            outcome
                .map_variant
                .map(|v| v.to_string())
                .unwrap_or_else(|| "no variant".to_string())
        ),
    }
    output::print_json(&serde_json::to_value(&outcome)?);
    Ok(())
}
