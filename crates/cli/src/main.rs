//! `starflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — validate a pipeline definition JSON file.
//! - `run`      — execute one pipeline run immediately.
//! - `schedule` — run the pipeline on its cron schedule until Ctrl-C.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use connections::ResourceRegistry;
use engine::{CronTrigger, PipelineDefinition, RunState, Scheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ResourcesConfig;

#[derive(Parser)]
#[command(name = "starflow", about = "Warehouse pipeline orchestration engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a pipeline definition JSON file.
    Validate {
        /// Path to the pipeline JSON file.
        path: PathBuf,
    },
    /// Execute one run of a pipeline right now.
    Run {
        /// Path to the pipeline JSON file.
        path: PathBuf,
        /// Path to the resources JSON file.
        #[arg(long)]
        resources: PathBuf,
        /// Logical execution date (RFC 3339); defaults to now.
        #[arg(long)]
        execution_date: Option<DateTime<Utc>>,
    },
    /// Trigger runs on the pipeline's cron schedule until interrupted.
    Schedule {
        /// Path to the pipeline JSON file.
        path: PathBuf,
        /// Path to the resources JSON file.
        #[arg(long)]
        resources: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let definition = load_definition(&path)?;
            match definition.build_graph().validate() {
                Ok(()) => {
                    println!(
                        "✅ Pipeline '{}' is valid ({} tasks).",
                        definition.name,
                        definition.tasks.len()
                    );
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
            if let Some(expr) = &definition.schedule {
                let trigger = CronTrigger::new(expr)?;
                println!("Next fire times for '{expr}':");
                for fire_time in trigger.upcoming(Utc::now(), 3) {
                    println!("  {fire_time}");
                }
            }
        }
        Command::Run {
            path,
            resources,
            execution_date,
        } => {
            let definition = load_definition(&path)?;
            let registry = load_registry(&resources).await?;
            let execution_date = execution_date.unwrap_or_else(Utc::now);

            let scheduler =
                Scheduler::new(definition.name.clone(), definition.build_graph(), registry);
            let report = scheduler.run(execution_date).await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.state == RunState::Failed {
                std::process::exit(1);
            }
        }
        Command::Schedule { path, resources } => {
            let definition = load_definition(&path)?;
            let Some(expr) = definition.schedule.clone() else {
                bail!("pipeline '{}' has no schedule", definition.name);
            };
            let trigger = CronTrigger::new(&expr)?;
            let registry = load_registry(&resources).await?;

            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("shutdown requested");
                        cancel.cancel();
                    }
                });
            }

            info!(
                "scheduling pipeline '{}' on '{}'",
                definition.name,
                trigger.expression()
            );
            // Fire times that pass while a run is in progress are skipped,
            // never queued: the next wait starts from the wall clock.
            while let Some(fire_time) = trigger.sleep_until_next(&cancel).await {
                info!("triggering run for {fire_time}");
                let scheduler = Scheduler::new(
                    definition.name.clone(),
                    definition.build_graph(),
                    Arc::clone(&registry),
                );
                let report = scheduler
                    .run_with_cancellation(fire_time, cancel.child_token())
                    .await?;
                info!("run {} finished: {}", report.run_id, report.state);
            }
            info!("scheduler stopped");
        }
    }

    Ok(())
}

fn load_definition(path: &Path) -> anyhow::Result<PipelineDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    PipelineDefinition::from_json(&text)
        .with_context(|| format!("invalid pipeline definition in {}", path.display()))
}

async fn load_registry(path: &Path) -> anyhow::Result<Arc<ResourceRegistry>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let config = ResourcesConfig::from_json(&text)
        .with_context(|| format!("invalid resources file {}", path.display()))?;
    Ok(Arc::new(config.build_registry().await?))
}
