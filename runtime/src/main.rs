// Copyright 2026 PlaceRank Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use placerank::MapVariant;
use placerank_runtime::cli::{self, sweep_cmd::SweepArgs};
use placerank_runtime::config::BackendKind;

#[derive(Parser)]
#[command(
    name = "placerank",
    about = "PlaceRank: find the local-search keywords a listing ranks for",
    version,
    after_help = "Run 'placerank <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Config file (defaults to PLACERANK_CONFIG, ./placerank.json, ~/.placerank/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
struct SweepFlags {
    /// Fixed keyword list, one per line (generated when omitted)
    #[arg(long)]
    keywords: Option<PathBuf>,
    /// Maximum number of generated keywords
    #[arg(long)]
    budget: Option<usize>,
    /// Map variant the target counts toward (current|legacy)
    #[arg(long)]
    prefer: Option<MapVariant>,
    /// Stop after this many hits over the preferred variant
    #[arg(long)]
    target: Option<usize>,
    /// Session backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,
    /// Check every keyword, even without location context
    #[arg(long)]
    no_filter: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep one business profile
    Sweep {
        /// Business profile JSON
        profile: PathBuf,
        /// Continue from a checkpoint file
        #[arg(long)]
        resume: Option<PathBuf>,
        #[command(flatten)]
        flags: SweepFlags,
    },
    /// Sweep several profiles in sequence
    Batch {
        /// Business profile JSON files
        #[arg(required = true)]
        profiles: Vec<PathBuf>,
        /// Continue each profile from its checkpoint when one exists
        #[arg(long)]
        resume: bool,
        #[command(flatten)]
        flags: SweepFlags,
    },
    /// Print generated candidates without searching
    Generate {
        /// Business profile JSON
        profile: PathBuf,
        /// Number of candidates
        #[arg(long, default_value = "100")]
        count: usize,
    },
    /// Resolve a saved results page offline
    Resolve {
        /// Saved payload (HTML)
        payload: PathBuf,
        /// Listing identifier
        #[arg(long)]
        id: String,
        /// Listing display name
        #[arg(long)]
        name: String,
        /// Listing address
        #[arg(long)]
        address: Option<String>,
    },
    /// Start the REST/SSE API on localhost
    Serve {
        #[arg(long, default_value = "7878")]
        port: u16,
        #[arg(long, value_enum)]
        backend: Option<BackendKind>,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

impl SweepFlags {
    fn into_args(self, config: Option<PathBuf>) -> SweepArgs {
        SweepArgs {
            config,
            keywords: self.keywords,
            budget: self.budget,
            prefer: self.prefer,
            target: self.target,
            backend: self.backend,
            no_filter: self.no_filter,
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "placerank=debug" } else { "placerank=info" };
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = level.parse() {
        filter = filter.add_directive(directive);
    }
    if let Ok(directive) = level.replacen("placerank", "placerank_runtime", 1).parse() {
        filter = filter.add_directive(directive);
    }
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("PLACERANK_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("PLACERANK_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("PLACERANK_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("PLACERANK_NO_COLOR", "1");
    }
    init_tracing(cli.verbose, cli.json);

    let config = cli.config;
    let result = match cli.command {
        Commands::Sweep { profile, resume, flags } => {
            cli::sweep_cmd::run(&profile, resume.as_deref(), &flags.into_args(config)).await
        }
        Commands::Batch { profiles, resume, flags } => {
            cli::batch::run(&profiles, resume, &flags.into_args(config)).await
        }
        Commands::Generate { profile, count } => {
            cli::generate_cmd::run(config.as_deref(), &profile, count).await
        }
        Commands::Resolve { payload, id, name, address } => {
            cli::resolve_cmd::run(config.as_deref(), &payload, &id, &name, address.as_deref()).await
        }
        Commands::Serve { port, backend } => {
            cli::serve_cmd::run(config.as_deref(), port, backend).await
        }
        Commands::Doctor => cli::doctor::run(config.as_deref()).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "placerank", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
