//! Admin CLI over the pipeline store
//!
//! Every command prints one JSON document to stdout.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use vulnwatch_core::config::Config;
use vulnwatch_core::domains::cve::CveStore;
use vulnwatch_core::domains::settings::SettingsStore;
use vulnwatch_core::domains::sources::{get_source_run_streaks, Source, SourceStore};
use vulnwatch_core::kernel::jobs::{JobQueue, JobType};
use vulnwatch_core::kernel::PostgresStore;

#[derive(Parser)]
#[command(name = "admin_cli")]
#[command(about = "Inspect and steer the pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Enqueue a job
    Enqueue {
        job_type: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
        /// Collapse onto an in-flight job of the same type
        #[arg(long)]
        debounce: bool,
    },

    /// List the most recent jobs
    ListJobs {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Add or update a polled source
    AddSource {
        id: String,
        name: String,
        url: String,
        #[arg(long, default_value_t = 60)]
        interval_minutes: i32,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },

    /// Current error and zero-result streaks for a source
    Streaks { source_id: String },

    /// Latest snapshot of a CVE
    CveSnapshot { cve_id: String },

    /// Read or write runtime settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    Get { key: String },
    /// Store a JSON value under `key`
    Set { key: String, value: String },
}

fn output<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = PostgresStore::connect(&config.database_url).await?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await?;
            output(&serde_json::json!({ "success": true }))
        }
        Commands::Enqueue {
            job_type,
            payload,
            debounce,
        } => cmd_enqueue(&store, &job_type, payload.as_deref(), debounce).await,
        Commands::ListJobs { limit } => output(&store.list_jobs(limit).await?),
        Commands::AddSource {
            id,
            name,
            url,
            interval_minutes,
            tags,
        } => {
            let mut source = Source::new(id, name, url);
            source.interval_minutes = interval_minutes;
            source.tags = tags
                .map(|t| {
                    t.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            store.upsert_source(&source).await?;
            output(&source)
        }
        Commands::Streaks { source_id } => {
            if store.get_source(&source_id).await?.is_none() {
                bail!("source not found: {source_id}");
            }
            output(&get_source_run_streaks(&store, &source_id).await?)
        }
        Commands::CveSnapshot { cve_id } => {
            let cve_id = cve_id.trim().to_ascii_uppercase();
            output(&store.latest_snapshot(&cve_id).await?)
        }
        Commands::Settings { command } => match command {
            SettingsCommand::Get { key } => output(&store.get_setting(&key).await?),
            SettingsCommand::Set { key, value } => {
                let value: serde_json::Value = serde_json::from_str(&value)
                    .with_context(|| format!("value for {key} must be JSON"))?;
                store.set_setting(&key, value.clone()).await?;
                output(&serde_json::json!({ "key": key, "value": value }))
            }
        },
    }
}

async fn cmd_enqueue(
    store: &PostgresStore,
    job_type: &str,
    payload: Option<&str>,
    debounce: bool,
) -> Result<()> {
    let job_type = JobType::from_str(job_type)?;
    let payload = payload
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("payload must be JSON")?;

    let result = store.enqueue(job_type.as_str(), payload, debounce).await?;
    output(&serde_json::json!({
        "job_id": result.job_id(),
        "job_type": job_type,
        "created": result.is_created(),
    }))
}
