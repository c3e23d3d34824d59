//! `placerank generate`: print candidates without searching.

use std::path::Path;

use anyhow::Result;
use placerank::CandidateGenerator;

use crate::cli::output;
use crate::cli::sweep_cmd;
use crate::config::RuntimeConfig;

pub async fn run(config: Option<&Path>, profile_path: &Path, count: usize) -> Result<()> {
    let config = RuntimeConfig::load(config)?;
    let vocab = config.vocabulary()?;
    let profile = sweep_cmd::load_profile(profile_path)?;

    let mut generator = CandidateGenerator::new(&profile, &vocab);
    let candidates = generator.next(count);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "business_id": profile.id,
            "category": generator.category_code(),
            "candidates": candidates,
        }));
        return Ok(());
    }

    if !output::is_quiet() {
        eprintln!(
            "  {} candidates for {} (category {})",
            candidates.len(),
            profile.name,
            generator.category_code()
        );
    }
    for c in &candidates {
        println!("{}\t{}", c.round, c.phrase);
    }
    Ok(())
}
