//! varens - ensemble variant-call coordination CLI
//!
//! ## Commands
//!
//! - `run`: group samples into batches and build a consensus callset per batch
//! - `group`: show how samples would be batched, without running anything
//! - `remove-overlaps`: drop overlapping records from a sorted interval file

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use varens_core::{group_by_batches, remove_overlaps, EnsemblePipeline, PipelineConfig, Sample};

#[derive(Parser)]
#[command(name = "varens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ensemble consensus over multiple variant callers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build consensus callsets for every qualifying batch
    Run {
        /// Pipeline configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Samples with their per-caller results (JSON array)
        #[arg(short, long)]
        samples: PathBuf,

        /// Where to write the updated samples (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Where to write the run report (JSON)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Override the configured number of concurrent batches
        #[arg(long, env = "VARENS_MAX_CONCURRENT")]
        max_concurrent: Option<usize>,

        /// Exit successfully even when some batches failed
        #[arg(long)]
        keep_going: bool,
    },

    /// Print the batch grouping of a sample list
    Group {
        /// Samples (JSON array)
        #[arg(short, long)]
        samples: PathBuf,
    },

    /// Write `<stem>-nooverlaps<ext>` with overlapping intervals removed
    RemoveOverlaps {
        /// Sorted interval file (BED-like or CNVkit bins)
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    varens_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            config,
            samples,
            out,
            report,
            max_concurrent,
            keep_going,
        } => {
            let failed = cmd_run(
                &config,
                &samples,
                out.as_deref(),
                report.as_deref(),
                max_concurrent,
            )
            .await?;
            if failed > 0 && !keep_going {
                anyhow::bail!("{failed} batch(es) failed; see the run report");
            }
            Ok(())
        }
        Commands::Group { samples } => cmd_group(&samples),
        Commands::RemoveOverlaps { input, out_dir } => cmd_remove_overlaps(&input, &out_dir).await,
    }
}

fn read_samples(path: &Path) -> Result<Vec<Sample>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples from {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse samples in {}", path.display()))
}

fn load_config(path: &Path, max_concurrent: Option<usize>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_yaml_file(path)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    if let Some(n) = max_concurrent {
        config.max_concurrent = n;
        config.validate()?;
    }
    Ok(config)
}

/// Returns the number of failed batches. Outputs are written either way.
async fn cmd_run(
    config_path: &Path,
    samples_path: &Path,
    out: Option<&Path>,
    report_path: Option<&Path>,
    max_concurrent: Option<usize>,
) -> Result<usize> {
    let config = load_config(config_path, max_concurrent)?;
    let samples = read_samples(samples_path)?;
    info!(
        samples = samples.len(),
        work_dir = %config.work_dir.display(),
        "starting ensemble run"
    );

    let pipeline = EnsemblePipeline::with_processes(config);
    let output = pipeline.combine_calls_parallel(samples).await;

    let json = serde_json::to_string_pretty(&output.samples)?;
    match out {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write samples to {}", path.display()))?,
        None => println!("{json}"),
    }
    if let Some(path) = report_path {
        output
            .report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    for failed in output.report.failed() {
        if let varens_core::BatchStatus::Failed { stage, error, .. } = &failed.status {
            eprintln!("batch {} failed during {}: {}", failed.batch_id, stage, error);
        }
    }
    Ok(output.report.failed().count())
}

fn cmd_group(samples_path: &Path) -> Result<()> {
    let samples = read_samples(samples_path)?;
    let grouping = group_by_batches(samples, Sample::has_ensemble);
    println!("{}", serde_json::to_string_pretty(&grouping)?);
    Ok(())
}

async fn cmd_remove_overlaps(input: &Path, out_dir: &Path) -> Result<()> {
    let out = remove_overlaps(input, out_dir)
        .await
        .with_context(|| format!("Failed to remove overlaps from {}", input.display()))?;
    println!("{}", out.display());
    Ok(())
}
