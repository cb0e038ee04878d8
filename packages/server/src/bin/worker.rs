//! Pipeline worker
//!
//! Claims jobs from the Postgres queue and runs them one at a time. Several
//! workers may run against the same database; the claim transaction keeps
//! them from picking the same job.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vulnwatch_core::config::{parse_job_types, Config};
use vulnwatch_core::domains::cve::NvdClient;
use vulnwatch_core::domains::pipeline::build_job_registry;
use vulnwatch_core::kernel::jobs::{JobRunner, JobRunnerConfig};
use vulnwatch_core::kernel::scheduled_tasks::start_scheduler;
use vulnwatch_core::kernel::{
    BaseSummarizer, CommandSiteBuilder, HttpContentFetcher, HttpIngestor, MarkdownPublisher,
    OpenAiSummarizer, PostgresStore, ServerDeps,
};

#[derive(Parser)]
#[command(name = "worker")]
#[command(about = "Run pipeline jobs from the queue")]
struct Cli {
    /// Identity written into `locked_by` (overrides WORKER_ID)
    #[arg(long)]
    worker_id: Option<String>,

    /// Comma-separated job types this worker may claim (overrides WORKER_JOB_TYPES)
    #[arg(long)]
    job_types: Option<String>,

    /// Drain the queue and exit instead of polling forever
    #[arg(long)]
    once: bool,

    /// Also run the cron scheduler in this process
    #[arg(long)]
    scheduler: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vulnwatch_core=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = Arc::new(PostgresStore::connect(&config.database_url).await?);
    store.migrate().await?;
    tracing::info!("migrations applied");

    let deps = Arc::new(build_deps(&config, store.clone())?);

    let allowed_types = match cli.job_types.as_deref() {
        Some(raw) => Some(parse_job_types(raw)?),
        None => config.job_types.clone(),
    };
    let runner_config = JobRunnerConfig {
        poll_interval: config.poll_interval(),
        worker_id: cli.worker_id.unwrap_or_else(|| config.worker_id.clone()),
        lease_timeout: Some(config.lease_timeout()),
        allowed_types,
    };
    let runner = JobRunner::with_config(
        store.clone(),
        Arc::new(build_job_registry()),
        deps,
        runner_config,
    );

    if cli.once {
        let processed = runner.drain().await?;
        tracing::info!(processed, "queue drained");
        return Ok(());
    }

    // Keep the scheduler alive for the lifetime of the runner.
    let _scheduler = if cli.scheduler || config.scheduler_enabled {
        Some(
            start_scheduler(store.clone())
                .await
                .context("Failed to start scheduler")?,
        )
    } else {
        None
    };

    runner.run_until_shutdown().await
}

fn build_deps(config: &Config, store: Arc<PostgresStore>) -> Result<ServerDeps> {
    let timeout = config.http_timeout();

    let summarizer: Option<Arc<dyn BaseSummarizer>> = match &config.openai_api_key {
        Some(api_key) => {
            let mut client = OpenAiSummarizer::new(api_key.clone(), timeout)?;
            if let Some(base_url) = &config.openai_base_url {
                client = client.with_base_url(base_url.clone());
            }
            Some(Arc::new(client))
        }
        None => {
            tracing::info!("OPENAI_API_KEY not set; LLM summaries disabled");
            None
        }
    };

    Ok(ServerDeps::builder()
        .jobs(store.clone())
        .settings(store.clone())
        .sources(store.clone())
        .articles(store.clone())
        .cves(store)
        .ingestor(Arc::new(HttpIngestor::new(timeout, &config.http_user_agent)?))
        .content_fetcher(Arc::new(HttpContentFetcher::new(
            timeout,
            &config.http_user_agent,
        )?))
        .summarizer(summarizer)
        .publisher(Arc::new(MarkdownPublisher::new(&config.site_content_dir)))
        .site_builder(Arc::new(CommandSiteBuilder::new(
            &config.site_dir,
            config.site_build_command.clone(),
        )))
        .cve_feed(Arc::new(NvdClient::new(
            timeout,
            &config.http_user_agent,
            config.nvd_api_key.clone(),
        )?))
        .build())
}
