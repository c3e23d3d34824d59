//! `placerank serve`: the localhost REST/SSE front end.

use std::path::Path;

use anyhow::Result;

use crate::cli::output::{self, Styled};
use crate::cli::sweep_cmd::{self, SweepArgs};
use crate::config::BackendKind;
use crate::rest::{self, ServeState};

pub async fn run(config: Option<&Path>, port: u16, backend: Option<BackendKind>) -> Result<()> {
    let args = SweepArgs {
        config: config.map(Path::to_path_buf),
        backend,
        ..Default::default()
    };
    let config = sweep_cmd::load_config(&args)?;
    let vocab = config.vocabulary()?;
    let pool = sweep_cmd::start_pool(&config).await?;

    if !output::is_quiet() {
        let s = Styled::new();
        eprintln!(
            "  {} PlaceRank API on http://127.0.0.1:{port} ({} backend)",
            s.ok_sym(),
            config.backend
        );
    }

    let state = ServeState::new(config, vocab, pool.clone());
    let served = tokio::select! {
        r = rest::start(port, state) => r,
        _ = tokio::signal::ctrl_c() => Ok(()),
    };
    pool.shutdown().await;
    served
}
