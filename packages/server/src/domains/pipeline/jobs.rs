//! Typed payloads for every pipeline job.
//!
//! Each struct names its [`JobType`]; handlers enqueue follow-on stages with
//! `deps.jobs.enqueue_job(payload)` and never build job rows by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::kernel::jobs::{JobPayload, JobType};

/// Fan out one `ingest_source` per due source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestDueSourcesJob {}

impl JobPayload for IngestDueSourcesJob {
    const JOB_TYPE: JobType = JobType::IngestDueSources;

    fn debounce(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSourceJob {
    pub source_id: String,
}

impl IngestSourceJob {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }
}

impl JobPayload for IngestSourceJob {
    const JOB_TYPE: JobType = JobType::IngestSource;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchArticleContentJob {
    pub article_id: Uuid,
}

impl JobPayload for FetchArticleContentJob {
    const JOB_TYPE: JobType = JobType::FetchArticleContent;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeArticleJob {
    pub article_id: Uuid,
}

impl JobPayload for SummarizeArticleJob {
    const JOB_TYPE: JobType = JobType::SummarizeArticleLlm;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteArticleMarkdownJob {
    pub article_id: Uuid,
}

impl JobPayload for WriteArticleMarkdownJob {
    const JOB_TYPE: JobType = JobType::WriteArticleMarkdown;
}

/// One CVE sync pass. `since` overrides the stored watermark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CveSyncJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

impl JobPayload for CveSyncJob {
    const JOB_TYPE: JobType = JobType::CveSync;

    fn debounce(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSiteJob {}

impl JobPayload for BuildSiteJob {
    const JOB_TYPE: JobType = JobType::BuildSite;

    fn debounce(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounced_job_types() {
        assert!(IngestDueSourcesJob::default().debounce());
        assert!(CveSyncJob::default().debounce());
        assert!(BuildSiteJob::default().debounce());
        assert!(!IngestSourceJob::new("s1").debounce());
        assert!(!FetchArticleContentJob { article_id: Uuid::nil() }.debounce());
    }

    #[test]
    fn test_serialization() {
        let job = IngestSourceJob::new("krebs");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json, serde_json::json!({ "source_id": "krebs" }));
        let deserialized: IngestSourceJob = serde_json::from_value(json).unwrap();
        assert_eq!(job, deserialized);
    }

    #[test]
    fn unit_payloads_accept_empty_object() {
        let _: IngestDueSourcesJob = serde_json::from_value(serde_json::json!({})).unwrap();
        let _: BuildSiteJob = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(
            serde_json::to_value(BuildSiteJob::default()).unwrap(),
            serde_json::json!({})
        );
        let sync: CveSyncJob = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(sync.since, None);
    }
}
