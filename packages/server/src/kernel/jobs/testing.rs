//! Job testing utilities.

use std::sync::Arc;

use anyhow::Result;

use super::{JobOutcome, JobRegistry, JobRunner, JobRunnerConfig};
use crate::kernel::ServerDeps;

/// Build a runner over `deps.jobs` with a fixed worker id and no lease reclaim.
pub fn test_runner(registry: JobRegistry, deps: Arc<ServerDeps>, worker_id: &str) -> JobRunner {
    let config = JobRunnerConfig {
        lease_timeout: None,
        ..JobRunnerConfig::with_worker_id(worker_id)
    };
    JobRunner::with_config(deps.jobs.clone(), Arc::new(registry), deps, config)
}

/// Run every claimable job, including follow-ups enqueued along the way.
///
/// Returns the outcome of each job in execution order.
pub async fn run_all_jobs(runner: &JobRunner) -> Result<Vec<JobOutcome>> {
    let mut outcomes = Vec::new();
    loop {
        match runner.process_next().await? {
            JobOutcome::Idle => return Ok(outcomes),
            outcome => outcomes.push(outcome),
        }
    }
}
