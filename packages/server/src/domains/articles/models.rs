use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::utils::stable_id_for_url;

/// A deduplicated content item, unique on `(source_id, stable_id)`.
///
/// The auxiliary columns are filled in place by later pipeline stages.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub source_id: String,
    pub stable_id: String,
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub content_text: Option<String>,
    pub content_fetched_at: Option<DateTime<Utc>>,
    pub summary_llm: Option<String>,
    pub summary_bullets: Option<serde_json::Value>,
    pub summary_why: Option<String>,
    pub summary_cves: Option<Vec<String>>,
    pub summary_model: Option<String>,
    pub summarized_at: Option<DateTime<Utc>>,
    pub markdown_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Article {
    /// Build a fresh row for `url`, deriving `stable_id` from the normalized URL.
    pub fn new(
        source_id: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
        summary: Option<String>,
    ) -> Result<Self> {
        let url = url.into();
        Ok(Self {
            id: Uuid::now_v7(),
            source_id: source_id.into(),
            stable_id: stable_id_for_url(&url)?,
            url,
            title: title.into(),
            published_at,
            summary,
            content_text: None,
            content_fetched_at: None,
            summary_llm: None,
            summary_bullets: None,
            summary_why: None,
            summary_cves: None,
            summary_model: None,
            summarized_at: None,
            markdown_path: None,
            created_at: Utc::now(),
        })
    }

    pub fn has_content(&self) -> bool {
        self.content_text
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn has_llm_summary(&self) -> bool {
        self.summary_llm
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    }

    /// Text handed to the summarizer and publisher: full content if fetched,
    /// else the feed summary.
    pub fn best_text(&self) -> &str {
        self.content_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .or(self.summary.as_deref())
            .unwrap_or("")
    }
}

/// Summarizer output stored on the article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub summary: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub why: Option<String>,
    #[serde(default)]
    pub cves: Vec<String>,
    pub model: String,
}
