//! CLI command definitions for motifab.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};

use crate::config::MotifabConfig;
use crate::denovo::CommandTool;
use crate::ledger::Ledger;
use crate::pipeline::Pipeline;

const DEFAULT_CONFIG: &str = "./motifab_config.json";

/// Benchmark pipeline for de novo motif discovery tools.
#[derive(Parser)]
#[command(name = "motifab")]
#[command(about = "Benchmark de novo motif discovery tools on synthetic datasets")]
#[command(version)]
#[command(
    long_about = "motifab synthesizes FASTA datasets with a known motif injected at controlled rates,\nruns external de novo discovery tools over the combinatorial sweep, and scores the\nrecovered motifs against the ground truth.\n\nExample usage:\n  motifab init\n  motifab run --config ./motifab_config.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Path to the experiment configuration JSON.
    #[arg(short, long, default_value = DEFAULT_CONFIG, global = true)]
    pub config: PathBuf,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Write a template configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Generate datasets and register work units.
    #[command(alias = "gen")]
    Generate,

    /// Run de novo discovery over eligible units.
    Denovo,

    /// Parse and score discovery results, then write CSV exports.
    Parse,

    /// Build heatmap grids from scored results.
    Heatmaps,

    /// Run all stages: generate, denovo, parse, heatmaps.
    Run,

    /// Print a per-status summary of the ledger.
    Status,
}

/// Parses CLI arguments. Split from execution so `main` can configure
/// logging from the parsed flags first.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes the parsed command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = &cli.command {
        return init_config(&cli.config, *force);
    }

    let config = MotifabConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating output dir {}", config.output_dir.display()))?;

    let ledger = Ledger::open(config.ledger_path()).await?;
    let pipeline = Pipeline::new(config, ledger, Arc::new(CommandTool::new()));

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Generate => {
            let summary = pipeline.generate().await?;
            info!(
                created = summary.created,
                retained = summary.retained,
                "Generation finished"
            );
        }
        Commands::Denovo => {
            let summary = pipeline.denovo().await?;
            if summary.has_failures() {
                bail!(
                    "{} of {} units failed discovery: {:?}",
                    summary.failed,
                    summary.dispatched,
                    summary.failed_keys
                );
            }
            info!(succeeded = summary.succeeded, "Discovery finished");
        }
        Commands::Parse => {
            let (rows, exports) = pipeline.parse().await?;
            info!(rows = rows.len(), exports = exports.len(), "Parsing finished");
        }
        Commands::Heatmaps => {
            let (rows, _) = pipeline.parse().await?;
            let files = pipeline.heatmaps(&rows).await?;
            info!(files = files.len(), "Heatmaps written");
        }
        Commands::Run => {
            let report = pipeline.run_all().await?;
            if report.halted {
                bail!(
                    "halted after discovery: {} failed units: {:?}",
                    report.discovery.failed,
                    report.discovery.failed_keys
                );
            }
            if report.has_failures() {
                bail!(
                    "pipeline completed with {} failed units: {:?}",
                    report.discovery.failed,
                    report.discovery.failed_keys
                );
            }
            info!("Pipeline finished cleanly");
        }
        Commands::Status => {
            let counts = pipeline.ledger().status_counts().await?;
            if counts.is_empty() {
                warn!("Ledger is empty; run `motifab generate` first");
            }
            for (status, count) in counts {
                println!("{:<24} {}", status.to_string(), count);
            }
        }
    }

    Ok(())
}

fn init_config(path: &PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    MotifabConfig::template().save(path)?;
    info!(path = %path.display(), "Wrote template configuration");
    Ok(())
}
