//! Per-article stages: content fetch, LLM summary, markdown artifact.
//!
//! Every stage re-reads the article and skips work that is already done, so
//! a job that runs twice (lease expiry, manual re-enqueue) is harmless.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domains::articles::Article;
use crate::domains::pipeline::jobs::{
    FetchArticleContentJob, SummarizeArticleJob, WriteArticleMarkdownJob,
};
use crate::domains::pipeline::routing::LlmRoute;
use crate::kernel::jobs::{JobPayload, JobQueueExt};
use crate::kernel::{ServerDeps, SummaryRequest};

async fn load_article(deps: &ServerDeps, article_id: Uuid) -> Result<Article> {
    deps.articles
        .get_article(article_id)
        .await?
        .ok_or_else(|| anyhow!("article not found: {article_id}"))
}

/// Result stored on per-article jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleStageResult {
    pub article_id: Uuid,
    /// `done`, or why the stage's own work was skipped
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ArticleStageResult {
    fn new(article_id: Uuid, outcome: &str) -> Self {
        Self {
            article_id,
            outcome: outcome.to_string(),
            next: None,
            path: None,
        }
    }
}

/// Enqueue the stage after content: the LLM summary when routed and
/// enabled, else the markdown write.
async fn enqueue_after_content(deps: &ServerDeps, article_id: Uuid) -> Result<String> {
    let route = LlmRoute::load(deps.settings.as_ref()).await?;
    if route.is_active(deps.summarizer.is_some()) {
        deps.jobs
            .enqueue_job(SummarizeArticleJob { article_id })
            .await?;
        Ok(SummarizeArticleJob::JOB_TYPE.as_str().to_string())
    } else {
        deps.jobs
            .enqueue_job(WriteArticleMarkdownJob { article_id })
            .await?;
        Ok(WriteArticleMarkdownJob::JOB_TYPE.as_str().to_string())
    }
}

pub async fn fetch_article_content(
    job: FetchArticleContentJob,
    deps: Arc<ServerDeps>,
) -> Result<ArticleStageResult> {
    let article = load_article(&deps, job.article_id).await?;

    let mut result = if article.has_content() {
        debug!(article_id = %article.id, "content already fetched");
        ArticleStageResult::new(article.id, "already_fetched")
    } else {
        let content = deps
            .content_fetcher
            .fetch_content(&article.url)
            .await
            .with_context(|| format!("content fetch failed for {}", article.url))?;
        deps.articles
            .set_article_content(article.id, &content, Utc::now())
            .await?;
        info!(article_id = %article.id, chars = content.len(), "article content fetched");
        ArticleStageResult::new(article.id, "done")
    };

    result.next = Some(enqueue_after_content(&deps, article.id).await?);
    Ok(result)
}

pub async fn summarize_article(
    job: SummarizeArticleJob,
    deps: Arc<ServerDeps>,
) -> Result<ArticleStageResult> {
    let article = load_article(&deps, job.article_id).await?;
    let route = LlmRoute::load(deps.settings.as_ref()).await?;

    let mut result = match (&deps.summarizer, article.has_llm_summary()) {
        (_, true) => ArticleStageResult::new(article.id, "already_summarized"),
        (Some(summarizer), false) if route.is_active(true) => {
            let source_name = deps
                .sources
                .get_source(&article.source_id)
                .await?
                .map(|s| s.name)
                .unwrap_or_else(|| article.source_id.clone());

            let request = SummaryRequest {
                title: article.title.clone(),
                source: source_name,
                url: article.url.clone(),
                content: article.best_text().to_string(),
                model: route.model.clone(),
            };
            let summary = summarizer.summarize(&request).await?;
            deps.articles
                .set_article_summary(article.id, &summary, Utc::now())
                .await?;
            info!(article_id = %article.id, model = %summary.model, "article summarized");
            ArticleStageResult::new(article.id, "done")
        }
        // Route switched off after this job was enqueued
        _ => ArticleStageResult::new(article.id, "llm_disabled"),
    };

    deps.jobs
        .enqueue_job(WriteArticleMarkdownJob {
            article_id: article.id,
        })
        .await?;
    result.next = Some(WriteArticleMarkdownJob::JOB_TYPE.as_str().to_string());
    Ok(result)
}

pub async fn write_article_markdown(
    job: WriteArticleMarkdownJob,
    deps: Arc<ServerDeps>,
) -> Result<ArticleStageResult> {
    let article = load_article(&deps, job.article_id).await?;
    let source = deps
        .sources
        .get_source(&article.source_id)
        .await?
        .ok_or_else(|| anyhow!("source not found: {}", article.source_id))?;

    let path = deps.publisher.write_article(&article, &source).await?;
    deps.articles
        .set_article_markdown_path(article.id, &path)
        .await?;
    info!(article_id = %article.id, path = %path, "article markdown written");

    let mut result = ArticleStageResult::new(article.id, "done");
    result.path = Some(path);
    Ok(result)
}
