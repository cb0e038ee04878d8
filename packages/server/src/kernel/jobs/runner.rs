//! Job runner service for processing background jobs.
//!
//! The `JobRunner` is the worker loop:
//! - Claims one job at a time from the queue (reclaiming stale leases)
//! - Executes it via the registry
//! - Marks it succeeded with the handler's result, or failed with the error
//!
//! # Architecture
//!
//! ```text
//! JobRunner
//!     │
//!     ├─► claim_next (one transaction, SKIP LOCKED)
//!     ├─► Execute via JobRegistry (deserialize + call handler, panics caught)
//!     └─► complete / fail (no automatic retry)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(build_job_registry());
//! let runner = JobRunner::with_config(deps.jobs.clone(), registry, deps, config);
//! runner.run_until_shutdown().await?;
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{Job, JobType};
use super::queue::JobQueue;
use super::registry::SharedJobRegistry;
use crate::kernel::ServerDeps;

/// Configuration for the job runner.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// Worker ID written into `locked_by`
    pub worker_id: String,
    /// Running jobs locked for longer than this are requeued on claim
    pub lease_timeout: Option<chrono::Duration>,
    /// Restrict claims to these job types
    pub allowed_types: Option<Vec<JobType>>,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            worker_id: format!("worker-{}", Uuid::new_v4()),
            lease_timeout: Some(chrono::Duration::minutes(15)),
            allowed_types: None,
        }
    }
}

impl JobRunnerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// What a single poll of the queue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Nothing was claimable
    Idle,
    Succeeded(Uuid),
    Failed(Uuid),
}

/// Background service that processes jobs from the queue.
pub struct JobRunner {
    job_queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    /// Create a new job runner.
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
    ) -> Self {
        Self::with_config(job_queue, registry, deps, JobRunnerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            job_queue,
            registry,
            deps,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &JobRunnerConfig {
        &self.config
    }

    /// Get a shutdown handle for graceful shutdown.
    ///
    /// Call `store(true, Ordering::SeqCst)` on the returned Arc to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Request shutdown of the runner.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Claim and execute at most one job.
    ///
    /// Handler errors and panics are recorded on the job and reported as
    /// [`JobOutcome::Failed`]; only queue errors surface as `Err`.
    pub async fn process_next(&self) -> Result<JobOutcome> {
        let allowed = self.config.allowed_types.as_deref();
        let claimed = self
            .job_queue
            .claim_next(&self.config.worker_id, allowed, self.config.lease_timeout)
            .await?;

        let Some(job) = claimed else {
            return Ok(JobOutcome::Idle);
        };

        let job_id = job.id;
        debug!(
            job_id = %job_id,
            job_type = %job.job_type,
            worker_id = %self.config.worker_id,
            "claimed job"
        );

        match self.dispatch(&job).await {
            Ok(result) => {
                info!(job_id = %job_id, job_type = %job.job_type, "job succeeded");
                let worker_id = self.config.worker_id.as_str();
                if !self.job_queue.complete(job_id, worker_id, result).await? {
                    warn!(job_id = %job_id, worker_id, "lease lost before completion; result dropped");
                }
                Ok(JobOutcome::Succeeded(job_id))
            }
            Err(message) => {
                warn!(job_id = %job_id, job_type = %job.job_type, error = %message, "job failed");
                let worker_id = self.config.worker_id.as_str();
                if !self.job_queue.fail(job_id, worker_id, &message).await? {
                    warn!(job_id = %job_id, worker_id, "lease lost before failure was recorded");
                }
                Ok(JobOutcome::Failed(job_id))
            }
        }
    }

    async fn dispatch(&self, job: &Job) -> std::result::Result<serde_json::Value, String> {
        let execution = self.registry.execute(job, self.deps.clone());
        match AssertUnwindSafe(execution).catch_unwind().await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(panic) => Err(format!("handler panicked: {}", panic_message(&*panic))),
        }
    }

    /// Process jobs until the queue has nothing claimable.
    ///
    /// Returns the number of jobs executed. Used by `worker --once` and tests.
    pub async fn drain(&self) -> Result<usize> {
        let mut processed = 0;
        while !self.is_shutdown_requested() {
            match self.process_next().await? {
                JobOutcome::Idle => break,
                JobOutcome::Succeeded(_) | JobOutcome::Failed(_) => processed += 1,
            }
        }
        Ok(processed)
    }

    /// Run the job runner until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            lease_timeout_secs = self.config.lease_timeout.map(|t| t.num_seconds()),
            "job runner starting"
        );

        while !self.is_shutdown_requested() {
            match self.process_next().await {
                Ok(JobOutcome::Idle) => tokio::time::sleep(self.config.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    error!(worker_id = %self.config.worker_id, error = %e, "job queue error");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }

    /// Run until a shutdown signal is received.
    ///
    /// Convenience method that listens for Ctrl+C. The current job always
    /// finishes before the loop exits.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
