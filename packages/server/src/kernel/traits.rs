// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Pipeline decisions (dedup, chaining, health) live in the domain handlers
// that call these traits.
//
// Naming convention: Base* for trait names (e.g., BaseSourceIngestor, BasePublisher)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::articles::{Article, ArticleSummary};
use crate::domains::cve::{CveFeedError, CvePage, CvePageRequest};
use crate::domains::sources::{RunStatus, Source};

// =============================================================================
// Source Ingestor Trait
// =============================================================================

/// A candidate article found by an ingestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedArticle {
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

/// Why an ingestor kept or skipped one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestDecision {
    pub url: String,
    /// `accepted`, `duplicate`, `filtered`, `old` or `invalid`
    pub decision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IngestDecision {
    pub fn new(url: impl Into<String>, decision: &str, reason: Option<String>) -> Self {
        Self {
            url: url.into(),
            decision: decision.to_string(),
            reason,
        }
    }
}

/// Result of polling one source.
///
/// `accepted_count` is the ingestor's own count of candidates; the stored
/// run counts what was actually new in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub status: RunStatus,
    pub http_status: Option<i32>,
    pub found_count: i32,
    pub accepted_count: i32,
    pub skipped_filtered: i32,
    pub skipped_old: i32,
    pub skipped_invalid: i32,
    pub error: Option<String>,
    pub articles: Vec<IngestedArticle>,
    pub decisions: Vec<IngestDecision>,
}

impl SourceResult {
    /// An ok result carrying `articles` and nothing skipped.
    pub fn ok(articles: Vec<IngestedArticle>) -> Self {
        let count = articles.len() as i32;
        Self {
            status: RunStatus::Ok,
            http_status: Some(200),
            found_count: count,
            accepted_count: count,
            skipped_filtered: 0,
            skipped_old: 0,
            skipped_invalid: 0,
            error: None,
            articles,
            decisions: Vec::new(),
        }
    }

    pub fn error(http_status: Option<i32>, error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            http_status,
            found_count: 0,
            accepted_count: 0,
            skipped_filtered: 0,
            skipped_old: 0,
            skipped_invalid: 0,
            error: Some(error.into()),
            articles: Vec::new(),
            decisions: Vec::new(),
        }
    }
}

#[async_trait]
pub trait BaseSourceIngestor: Send + Sync {
    /// Poll a source. Fetch failures should come back as an error
    /// [`SourceResult`]; an `Err` is treated the same way by the caller.
    async fn ingest(&self, source: &Source) -> Result<SourceResult>;
}

// =============================================================================
// Content Fetcher Trait
// =============================================================================

#[async_trait]
pub trait BaseContentFetcher: Send + Sync {
    /// Fetch an article page and return its main text.
    async fn fetch_content(&self, url: &str) -> Result<String>;
}

// =============================================================================
// Summarizer Trait (LLM)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub title: String,
    pub source: String,
    pub url: String,
    pub content: String,
    /// Model requested by the `llm.summarize` route
    pub model: Option<String>,
}

#[async_trait]
pub trait BaseSummarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<ArticleSummary>;
}

// =============================================================================
// Publisher Trait
// =============================================================================

#[async_trait]
pub trait BasePublisher: Send + Sync {
    /// Write the article artifact and return its path. Re-writing the same
    /// article overwrites the same file.
    async fn write_article(&self, article: &Article, source: &Source) -> Result<String>;
}

// =============================================================================
// Site Builder Trait
// =============================================================================

#[async_trait]
pub trait BaseSiteBuilder: Send + Sync {
    /// Build the static site; returns a short output summary.
    async fn build(&self) -> Result<String>;
}

// =============================================================================
// CVE Feed Trait
// =============================================================================

#[async_trait]
pub trait BaseCveFeed: Send + Sync {
    async fn fetch_page(&self, request: &CvePageRequest) -> Result<CvePage, CveFeedError>;
}
