//! Job queue contract and its PostgreSQL implementation.
//!
//! All coordination between workers happens here: `claim_next` is the single
//! synchronization point, and it runs inside one transaction so a row can
//! only move `queued → running` for one caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::job::{Job, JobType, STALE_LOCK_ERROR};
use crate::kernel::store::PostgresStore;

const JOB_COLUMNS: &str = "id, job_type, status, payload, result, requested_at, started_at, \
     finished_at, locked_by, locked_at, error";

/// Result type for enqueue operations that handles debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// A new job row was inserted
    Created(Uuid),
    /// An in-flight job of the same type already existed (debounce hit)
    Duplicate(Uuid),
}

impl EnqueueResult {
    /// Get the job ID regardless of whether it was created or duplicate
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    /// Returns true if this was a newly created job
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// Trait for job queue operations.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a queued job.
    ///
    /// With `debounce`, an existing queued/running job of the same type is
    /// returned as [`EnqueueResult::Duplicate`] and nothing is inserted.
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Option<serde_json::Value>,
        debounce: bool,
    ) -> Result<EnqueueResult>;

    /// Claim the oldest queued job for `worker_id`.
    ///
    /// When `lease_timeout` is given, running jobs whose lease is older than
    /// it are requeued first. Returns `None` when nothing is claimable or a
    /// concurrent writer won the row.
    async fn claim_next(
        &self,
        worker_id: &str,
        allowed_types: Option<&[JobType]>,
        lease_timeout: Option<chrono::Duration>,
    ) -> Result<Option<Job>>;

    /// `running → succeeded`. Returns false unless the job is running under
    /// `worker_id`'s lease.
    async fn complete(&self, job_id: Uuid, worker_id: &str, result: serde_json::Value)
        -> Result<bool>;

    /// `running → failed`. Returns false unless the job is running under
    /// `worker_id`'s lease.
    async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<bool>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Most recently requested jobs first.
    async fn list_jobs(&self, limit: i64) -> Result<Vec<Job>>;
}

/// Typed job payloads.
///
/// Each pipeline stage defines a payload struct that names its job type, so
/// handlers never build job rows by hand.
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const JOB_TYPE: JobType;

    /// Whether enqueueing should collapse onto an in-flight job of this type.
    fn debounce(&self) -> bool {
        false
    }
}

/// Convenience methods over any [`JobQueue`].
#[async_trait]
pub trait JobQueueExt {
    /// Enqueue a typed payload.
    async fn enqueue_job<P: JobPayload>(&self, payload: P) -> Result<EnqueueResult>;
}

#[async_trait]
impl<Q: JobQueue + ?Sized> JobQueueExt for Q {
    async fn enqueue_job<P: JobPayload>(&self, payload: P) -> Result<EnqueueResult> {
        let debounce = payload.debounce();
        let value = serde_json::to_value(&payload)
            .with_context(|| format!("failed to serialize {} payload", P::JOB_TYPE))?;
        self.enqueue(P::JOB_TYPE.as_str(), Some(value), debounce)
            .await
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[async_trait]
impl JobQueue for PostgresStore {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Option<serde_json::Value>,
        debounce: bool,
    ) -> Result<EnqueueResult> {
        let mut tx = self.pool().begin().await?;

        if debounce {
            // Serializes check-then-insert per job type across workers.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(job_type)
                .execute(&mut *tx)
                .await?;

            let existing = sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT id FROM jobs
                WHERE job_type = $1 AND status IN ('queued', 'running')
                ORDER BY requested_at
                LIMIT 1
                "#,
            )
            .bind(job_type)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(id) = existing {
                tx.commit().await?;
                debug!(job_id = %id, job_type, "debounced enqueue hit in-flight job");
                return Ok(EnqueueResult::Duplicate(id));
            }
        }

        let job = Job::new(job_type, payload);
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, status, payload, requested_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(job.status)
        .bind(&job.payload)
        .bind(job.requested_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(job_id = %job.id, job_type, "enqueued job");
        Ok(EnqueueResult::Created(job.id))
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        allowed_types: Option<&[JobType]>,
        lease_timeout: Option<chrono::Duration>,
    ) -> Result<Option<Job>> {
        let mut tx = self.pool().begin().await?;

        if let Some(timeout) = lease_timeout {
            let cutoff = Utc::now() - timeout;
            let requeued = sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'queued', locked_by = NULL, locked_at = NULL, error = $1
                WHERE status = 'running' AND locked_at < $2
                "#,
            )
            .bind(STALE_LOCK_ERROR)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if requeued > 0 {
                warn!(count = requeued, worker_id, "requeued jobs with stale leases");
            }
        }

        let type_names: Option<Vec<String>> = allowed_types
            .map(|types| types.iter().map(|t| t.as_str().to_string()).collect());

        let candidate = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM jobs
            WHERE status = 'queued'
              AND locked_by IS NULL
              AND ($1::text[] IS NULL OR job_type = ANY($1))
            ORDER BY requested_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(type_names)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job_id) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = NOW(), locked_by = $1, locked_at = NOW()
            WHERE id = $2 AND status = 'queued'
            RETURNING {JOB_COLUMNS}
            "#
        );
        let claimed = sqlx::query_as::<_, Job>(&sql)
            .bind(worker_id)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(claimed)
    }

    async fn complete(
        &self,
        job_id: Uuid,
        worker_id: &str,
        result: serde_json::Value,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded', result = $3, finished_at = NOW(),
                locked_by = NULL, locked_at = NULL
            WHERE id = $1 AND status = 'running' AND locked_by = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(result)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', error = $3, finished_at = NOW(),
                locked_by = NULL, locked_at = NULL
            WHERE id = $1 AND status = 'running' AND locked_by = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(error)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(job)
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY requested_at DESC LIMIT $1");
        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(jobs)
    }
}
