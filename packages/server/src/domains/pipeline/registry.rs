//! Wires every pipeline handler into a [`JobRegistry`].

use std::future::Future;

use anyhow::Result;
use serde::Serialize;

use super::activities;
use super::jobs::{
    BuildSiteJob, CveSyncJob, FetchArticleContentJob, IngestDueSourcesJob, IngestSourceJob,
    SummarizeArticleJob, WriteArticleMarkdownJob,
};
use crate::kernel::jobs::JobRegistry;

async fn to_json<T, Fut>(fut: Fut) -> Result<serde_json::Value>
where
    T: Serialize,
    Fut: Future<Output = Result<T>>,
{
    Ok(serde_json::to_value(fut.await?)?)
}

/// Registry with a handler for every [`JobType`](crate::kernel::jobs::JobType).
pub fn build_job_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();

    registry.register::<IngestDueSourcesJob, _, _>(|job, deps| {
        to_json(activities::ingest_due_sources(job, deps))
    });
    registry.register::<IngestSourceJob, _, _>(|job, deps| {
        to_json(activities::ingest_source(job, deps))
    });
    registry.register::<FetchArticleContentJob, _, _>(|job, deps| {
        to_json(activities::fetch_article_content(job, deps))
    });
    registry.register::<SummarizeArticleJob, _, _>(|job, deps| {
        to_json(activities::summarize_article(job, deps))
    });
    registry.register::<WriteArticleMarkdownJob, _, _>(|job, deps| {
        to_json(activities::write_article_markdown(job, deps))
    });
    registry.register::<CveSyncJob, _, _>(|job, deps| to_json(activities::cve_sync(job, deps)));
    registry.register::<BuildSiteJob, _, _>(|job, deps| to_json(activities::build_site(job, deps)));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::JobType;

    #[test]
    fn every_job_type_has_a_handler() {
        let registry = build_job_registry();
        for job_type in JobType::ALL {
            assert!(registry.is_registered(job_type), "{job_type} not registered");
        }
    }
}
