//! CLI command definitions for calforge.
//!
//! This module provides a streamlined command-line interface for running
//! the calendar-generation pipeline against a run-config file.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::ai::HttpAiBackend;
use crate::pipeline::{CancelToken, Orchestrator, PipelineConfig, RunConfig, RunStatus};
use crate::sources::{ConfiguredSourceAdapter, DataSourceRegistry, KNOWN_SOURCES};
use crate::steps::catalog;

/// Content-calendar generation pipeline.
#[derive(Parser)]
#[command(name = "calforge")]
#[command(about = "Generate structured content calendars through a multi-phase AI pipeline")]
#[command(version)]
#[command(
    long_about = "calforge orchestrates a 12-step, 4-phase prompt-chaining pipeline that turns \
strategy, audience, and keyword data into a quality-gated content calendar.\n\nExample usage:\n  \
calforge run --config ./run.yaml --output ./calendar.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full pipeline against a run-config file.
    Run(RunArgs),

    /// Print the step catalog.
    Steps,
}

/// Arguments for `calforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the run config (JSON or YAML).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Where to write the assembled calendar JSON.
    #[arg(short, long, default_value = "./calendar.json")]
    pub output: PathBuf,

    /// Also write the quality report next to the calendar.
    #[arg(long, default_value = "true")]
    pub report: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Execute the parsed CLI command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Steps => {
            print_steps();
            Ok(())
        }
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let run_config = RunConfig::load(&args.config)?;
    let pipeline_config = PipelineConfig::from_env()?;
    let backend = Arc::new(HttpAiBackend::from_env()?);

    let mut registry = DataSourceRegistry::new(pipeline_config.source_fetch_width);
    for source in KNOWN_SOURCES {
        registry.register(Arc::new(ConfiguredSourceAdapter::new(source)));
    }

    let orchestrator = Orchestrator::new(pipeline_config, registry, backend)?;
    let cancel = CancelToken::new();

    // Ctrl-C cancels cooperatively: in-flight attempts finish, the run
    // aborts with partial context.
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    let outcome = orchestrator.run(run_config, cancel).await?;

    let report_path = args.output.with_extension("report.json");
    if args.report {
        std::fs::write(
            &report_path,
            serde_json::to_string_pretty(&outcome.quality_report)?,
        )?;
    }

    match outcome.status {
        RunStatus::Completed => {
            let artifact = outcome.artifact.expect("completed run carries an artifact");
            std::fs::write(&args.output, serde_json::to_string_pretty(&artifact)?)?;
            info!(
                run_id = %outcome.run_id,
                output = %args.output.display(),
                aggregate_quality =
                    format!("{:.3}", outcome.quality_report.aggregate_quality),
                flagged = outcome.quality_report.flagged().len(),
                "Calendar written"
            );
            Ok(())
        }
        RunStatus::Aborted => {
            let trail: Vec<String> = outcome
                .quality_report
                .steps
                .iter()
                .map(|entry| format!("{} [{}]", entry.step_id, entry.status))
                .collect();
            anyhow::bail!(
                "run {} aborted after {} step(s): {}; diagnostics in {}",
                outcome.run_id,
                trail.len(),
                trail.join(", "),
                if args.report {
                    report_path.display().to_string()
                } else {
                    "quality report (disabled)".to_string()
                }
            )
        }
    }
}

fn print_steps() {
    println!("{:<4} {:<14} {:<22} gates", "seq", "phase", "step");
    for def in catalog() {
        let gates: Vec<String> = def
            .gates
            .iter()
            .map(|spec| {
                format!(
                    "{}{}",
                    spec.name,
                    if spec.required { "*" } else { "" }
                )
            })
            .collect();
        println!(
            "{:<4} {:<14} {:<22} {}{}",
            def.sequence_number,
            def.phase.to_string(),
            def.id,
            gates.join(", "),
            if def.independent_of_siblings {
                "  (independent)"
            } else {
                ""
            }
        );
    }
    println!("\n* = required gate");
}
