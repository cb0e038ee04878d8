//! Job model for background pipeline execution.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Error text written onto a job whose lease expired and was requeued.
pub const STALE_LOCK_ERROR: &str = "stale_lock_requeued";

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether the job is queued or running.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Closed set of job kinds the worker knows how to run.
///
/// The `job_type` column stays free text so that rows written by newer or
/// older deployments can still be read; dispatch parses it into this enum
/// and rejects anything else with [`JobError::UnknownJobType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    IngestDueSources,
    IngestSource,
    FetchArticleContent,
    SummarizeArticleLlm,
    WriteArticleMarkdown,
    CveSync,
    BuildSite,
}

impl JobType {
    pub const ALL: [JobType; 7] = [
        JobType::IngestDueSources,
        JobType::IngestSource,
        JobType::FetchArticleContent,
        JobType::SummarizeArticleLlm,
        JobType::WriteArticleMarkdown,
        JobType::CveSync,
        JobType::BuildSite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::IngestDueSources => "ingest_due_sources",
            JobType::IngestSource => "ingest_source",
            JobType::FetchArticleContent => "fetch_article_content",
            JobType::SummarizeArticleLlm => "summarize_article_llm",
            JobType::WriteArticleMarkdown => "write_article_markdown",
            JobType::CveSync => "cve_sync",
            JobType::BuildSite => "build_site",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| JobError::UnknownJobType(s.to_string()))
    }
}

/// Typed dispatch failures. Each one ends with the job marked `failed`.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("no handler registered for job type: {0}")]
    NoHandler(JobType),

    #[error("invalid payload for {job_type}")]
    InvalidPayload {
        job_type: JobType,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub payload: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(job_type: &str, payload: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_type: job_type.to_string(),
            status: JobStatus::Queued,
            payload,
            result: None,
            requested_at: Utc::now(),
            started_at: None,
            finished_at: None,
            locked_by: None,
            locked_at: None,
            error: None,
        }
    }

    /// Parse the stored job type into the closed [`JobType`] set.
    pub fn kind(&self) -> Result<JobType, JobError> {
        self.job_type.parse()
    }

    /// Whether the lease on this job is older than `lease_timeout`.
    pub fn lease_expired(&self, lease_timeout: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Running
            && self
                .locked_at
                .map(|locked_at| locked_at < now - lease_timeout)
                .unwrap_or(false)
    }
}
