//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Ticks never do pipeline work themselves; they debounce-enqueue the entry
//! jobs and let the worker loop pick them up.
//!
//! ```text
//! Scheduler (every 5 minutes)
//!     └─► enqueue ingest_due_sources (debounced)
//!             └─► worker → ingest_source per due source → ...
//!
//! Scheduler (hourly)
//!     └─► enqueue cve_sync (debounced)
//!
//! Scheduler (every 15 minutes)
//!     └─► enqueue build_site (debounced)
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::pipeline::{BuildSiteJob, CveSyncJob, IngestDueSourcesJob};
use crate::kernel::jobs::{JobPayload, JobQueue, JobQueueExt};

pub const INGEST_SCHEDULE: &str = "0 */5 * * * *";
pub const CVE_SYNC_SCHEDULE: &str = "0 0 * * * *";
pub const BUILD_SITE_SCHEDULE: &str = "0 */15 * * * *";

/// Start all scheduled tasks
pub async fn start_scheduler(jobs: Arc<dyn JobQueue>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let ingest_jobs = jobs.clone();
    let ingest_tick = Job::new_async(INGEST_SCHEDULE, move |_uuid, _lock| {
        let jobs = ingest_jobs.clone();
        Box::pin(async move {
            if let Err(e) = enqueue_tick(jobs.as_ref(), IngestDueSourcesJob::default()).await {
                tracing::error!(error = %e, "ingest tick failed");
            }
        })
    })?;
    scheduler.add(ingest_tick).await?;

    let cve_jobs = jobs.clone();
    let cve_tick = Job::new_async(CVE_SYNC_SCHEDULE, move |_uuid, _lock| {
        let jobs = cve_jobs.clone();
        Box::pin(async move {
            if let Err(e) = enqueue_tick(jobs.as_ref(), CveSyncJob::default()).await {
                tracing::error!(error = %e, "CVE sync tick failed");
            }
        })
    })?;
    scheduler.add(cve_tick).await?;

    let site_jobs = jobs.clone();
    let site_tick = Job::new_async(BUILD_SITE_SCHEDULE, move |_uuid, _lock| {
        let jobs = site_jobs.clone();
        Box::pin(async move {
            if let Err(e) = enqueue_tick(jobs.as_ref(), BuildSiteJob::default()).await {
                tracing::error!(error = %e, "site build tick failed");
            }
        })
    })?;
    scheduler.add(site_tick).await?;

    scheduler.start().await?;

    tracing::info!(
        ingest = INGEST_SCHEDULE,
        cve_sync = CVE_SYNC_SCHEDULE,
        build_site = BUILD_SITE_SCHEDULE,
        "scheduled tasks started"
    );
    Ok(scheduler)
}

/// Enqueue one scheduled job, collapsing onto an in-flight one.
pub async fn enqueue_tick<P: JobPayload>(jobs: &dyn JobQueue, payload: P) -> Result<()> {
    let result = jobs.enqueue_job(payload).await?;
    if result.is_created() {
        tracing::info!(job_id = %result.job_id(), job_type = %P::JOB_TYPE, "scheduled job enqueued");
    } else {
        tracing::debug!(job_id = %result.job_id(), job_type = %P::JOB_TYPE, "scheduled job already in flight");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::JobType;
    use crate::kernel::memory_store::MemoryStore;

    #[tokio::test]
    async fn repeated_ticks_collapse_onto_one_job() {
        let store = MemoryStore::new();

        enqueue_tick(&store, IngestDueSourcesJob::default()).await.unwrap();
        enqueue_tick(&store, IngestDueSourcesJob::default()).await.unwrap();
        enqueue_tick(&store, CveSyncJob::default()).await.unwrap();

        let jobs = store.list_jobs(10).await.unwrap();
        let ingest = jobs
            .iter()
            .filter(|j| j.job_type == JobType::IngestDueSources.as_str())
            .count();
        assert_eq!(ingest, 1);
        assert_eq!(jobs.len(), 2);
    }
}
