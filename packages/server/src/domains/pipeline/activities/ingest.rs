//! Source ingestion: fan-out over due sources and the per-source poll.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domains::articles::Article;
use crate::domains::pipeline::jobs::{
    FetchArticleContentJob, IngestDueSourcesJob, IngestSourceJob, WriteArticleMarkdownJob,
};
use crate::domains::pipeline::routing::fetch_full_content;
use crate::domains::sources::{apply_health_policy, RunStatus, SourceRun};
use crate::kernel::jobs::JobQueueExt;
use crate::kernel::{IngestDecision, ServerDeps, SourceResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestDueSourcesResult {
    pub due: usize,
    pub enqueued: Vec<String>,
}

pub async fn ingest_due_sources(
    _job: IngestDueSourcesJob,
    deps: Arc<ServerDeps>,
) -> Result<IngestDueSourcesResult> {
    let due = deps.sources.list_due_sources(Utc::now()).await?;

    let mut enqueued = Vec::with_capacity(due.len());
    for source in &due {
        deps.jobs
            .enqueue_job(IngestSourceJob::new(source.id.clone()))
            .await?;
        enqueued.push(source.id.clone());
    }

    info!(due = due.len(), "ingest_source jobs enqueued for due sources");
    Ok(IngestDueSourcesResult {
        due: due.len(),
        enqueued,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSourceResult {
    pub source_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    pub found: i32,
    pub accepted: i32,
    pub skipped_duplicate: i32,
    /// Duplicates with no markdown yet, chained again
    #[serde(default)]
    pub resumed: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<String>,
}

/// Poll one source, store new articles, record the run, chain the next
/// stage per new article and apply the health policy.
///
/// A failed poll is not a job failure: it is recorded as an `error` run and
/// feeds the health governor. A duplicate that never got its markdown
/// artifact is chained again, so a rerun after a crash picks it back up.
pub async fn ingest_source(job: IngestSourceJob, deps: Arc<ServerDeps>) -> Result<IngestSourceResult> {
    let now = Utc::now();
    let source = deps
        .sources
        .get_source(&job.source_id)
        .await?
        .ok_or_else(|| anyhow!("source not found: {}", job.source_id))?;

    let skip_reason = if source.is_paused(now) {
        Some("paused")
    } else if !source.enabled {
        Some("disabled")
    } else {
        None
    };
    if let Some(reason) = skip_reason {
        info!(source_id = %source.id, reason, "source not polled");
        return Ok(IngestSourceResult {
            source_id: source.id,
            status: "skipped".to_string(),
            skipped: Some(reason.to_string()),
            found: 0,
            accepted: 0,
            skipped_duplicate: 0,
            resumed: 0,
            error: None,
            paused: None,
        });
    }

    let result = match deps.ingestor.ingest(&source).await {
        Ok(result) => result,
        Err(e) => SourceResult::error(None, format!("{e:#}")),
    };

    let mut run = SourceRun::new(source.id.clone(), result.status);
    run.http_status = result.http_status;
    run.found_count = result.found_count;
    run.skipped_filtered = result.skipped_filtered;
    run.skipped_old = result.skipped_old;
    run.skipped_invalid = result.skipped_invalid;
    run.error = result.error.clone();

    // Candidate-level decisions are re-made against the store below.
    let mut decisions: Vec<IngestDecision> = result
        .decisions
        .iter()
        .filter(|d| d.decision != "accepted")
        .cloned()
        .collect();
    let mut new_articles = Vec::new();
    let mut unfinished = Vec::new();

    if result.status == RunStatus::Ok {
        for candidate in &result.articles {
            let article = match Article::new(
                source.id.clone(),
                candidate.url.clone(),
                candidate.title.clone(),
                candidate.published_at,
                candidate.summary.clone(),
            ) {
                Ok(article) => article,
                Err(e) => {
                    run.skipped_invalid += 1;
                    decisions.push(IngestDecision::new(
                        candidate.url.clone(),
                        "invalid",
                        Some(format!("{e:#}")),
                    ));
                    continue;
                }
            };

            match deps.articles.insert_article_if_new(&article).await? {
                Some(stored) => {
                    decisions.push(IngestDecision::new(stored.url.clone(), "accepted", None));
                    new_articles.push(stored);
                }
                None => {
                    run.skipped_duplicate += 1;
                    decisions.push(IngestDecision::new(candidate.url.clone(), "duplicate", None));

                    // Stored by an earlier attempt that died before chaining it.
                    if let Some(stored) = deps
                        .articles
                        .get_article_by_stable_id(&source.id, &article.stable_id)
                        .await?
                    {
                        let seen = new_articles
                            .iter()
                            .chain(&unfinished)
                            .any(|a: &Article| a.id == stored.id);
                        if stored.markdown_path.is_none() && !seen {
                            unfinished.push(stored);
                        }
                    }
                }
            }
        }
    }

    run.accepted_count = new_articles.len() as i32;
    run.decisions = serde_json::to_value(&decisions)?;
    deps.sources.record_run(&run).await?;

    let fetch_content = fetch_full_content(deps.settings.as_ref()).await?;
    for article in new_articles.iter().chain(&unfinished) {
        if fetch_content {
            deps.jobs
                .enqueue_job(FetchArticleContentJob {
                    article_id: article.id,
                })
                .await?;
        } else {
            deps.jobs
                .enqueue_job(WriteArticleMarkdownJob {
                    article_id: article.id,
                })
                .await?;
        }
    }
    if !unfinished.is_empty() {
        info!(
            source_id = %source.id,
            count = unfinished.len(),
            "re-chained stored articles without markdown"
        );
    }

    if run.is_error() {
        warn!(
            source_id = %source.id,
            http_status = ?run.http_status,
            error = run.error.as_deref().unwrap_or(""),
            "source poll failed"
        );
    } else {
        info!(
            source_id = %source.id,
            found = run.found_count,
            accepted = run.accepted_count,
            duplicates = run.skipped_duplicate,
            "source polled"
        );
    }

    let alert = apply_health_policy(
        deps.sources.as_ref(),
        deps.settings.as_ref(),
        &source.id,
        Utc::now(),
    )
    .await?;

    Ok(IngestSourceResult {
        source_id: source.id,
        status: run.status.to_string(),
        skipped: None,
        found: run.found_count,
        accepted: run.accepted_count,
        skipped_duplicate: run.skipped_duplicate,
        resumed: unfinished.len() as i32,
        error: run.error,
        paused: alert.map(|a| a.alert_type),
    })
}
