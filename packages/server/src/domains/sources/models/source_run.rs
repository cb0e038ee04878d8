use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Outcome of one ingest attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "source_run_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ok => f.write_str("ok"),
            RunStatus::Error => f.write_str("error"),
        }
    }
}

/// Append-only record of one ingest attempt. Never updated after insert.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct SourceRun {
    pub id: Uuid,
    pub source_id: String,
    pub status: RunStatus,
    pub http_status: Option<i32>,
    pub found_count: i32,
    /// Articles newly stored by this run
    pub accepted_count: i32,
    pub skipped_duplicate: i32,
    pub skipped_filtered: i32,
    pub skipped_old: i32,
    pub skipped_invalid: i32,
    pub error: Option<String>,
    pub decisions: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SourceRun {
    /// Run for `source_id` with zero counts, stamped now.
    pub fn new(source_id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: Uuid::now_v7(),
            source_id: source_id.into(),
            status,
            http_status: None,
            found_count: 0,
            accepted_count: 0,
            skipped_duplicate: 0,
            skipped_filtered: 0,
            skipped_old: 0,
            skipped_invalid: 0,
            error: None,
            decisions: serde_json::Value::Array(Vec::new()),
            created_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == RunStatus::Error
    }
}
