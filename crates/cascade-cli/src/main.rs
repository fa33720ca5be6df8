//! `cascade` CLI entry point: `run` a pipeline to quiescence, or `unroll`
//! one message's provenance from an existing database (spec §4.9).

use cascade_config::{PipelineConfig, StepRegistry};
use cascade_engine::{Engine, Manager, Storage};
use cascade_storage::SqliteStorage;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Durable, content-addressed streaming pipeline engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a pipeline config, build the engine, and run it to quiescence.
    Run {
        /// Path to a pipeline YAML file (spec §4.8).
        config: PathBuf,
    },
    /// Open a database read-only and print a message's ancestral payloads
    /// as pretty JSON.
    Unroll {
        /// Path to the project's `<project>.db` SQLite file.
        db: PathBuf,
        /// The cascade id to unroll.
        cascade_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config } => run(config).await,
        Command::Unroll { db, cascade_id } => unroll(db, cascade_id).await,
    }
}

async fn run(config_path: PathBuf) -> anyhow::Result<()> {
    let registry = StepRegistry::with_builtins();
    let config = PipelineConfig::load(&config_path, &registry)?;
    let project = config.project.clone();

    let storage = Arc::new(SqliteStorage::for_project(&project).await?);
    let engine: Engine = config.into_engine(&registry, storage).await?;

    tracing::info!(project = project.as_str(), "starting pipeline");
    engine.run().await?;
    tracing::info!(project = project.as_str(), "pipeline finished");
    Ok(())
}

/// Opens storage read-only: only `exists`/`get`/`list_messages` are ever
/// called here, matching the "explorer" contract of spec §6 — no `store`
/// call, so `unroll` never mutates the database it inspects.
async fn unroll(db_path: PathBuf, cascade_id: String) -> anyhow::Result<()> {
    let url = format!("sqlite:{}?mode=ro", db_path.display());
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_existing(&url).await?);

    let message = storage
        .get(&cascade_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no message with cascade id '{cascade_id}' in {}", db_path.display()))?;

    let manager = Manager::new(storage);
    let history = manager.unroll(&message).await?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
