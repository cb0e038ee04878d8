//! Vulnerability feed client (NVD CVE API 2.0 wire format).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::kernel::BaseCveFeed;

/// Feed failures, classified for the retry loop.
#[derive(Debug, Error)]
pub enum CveFeedError {
    /// Rate limiting, unavailability, timeouts and connection errors.
    #[error("transient feed error: {0}")]
    Transient(String),

    #[error("feed returned HTTP {status}: {body}")]
    Permanent { status: u16, body: String },

    #[error("failed to decode feed page: {0}")]
    Decode(String),
}

impl CveFeedError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CveFeedError::Transient(_))
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            CveFeedError::Transient(format!("HTTP {}", status.as_u16()))
        } else {
            CveFeedError::Permanent {
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl From<reqwest::Error> for CveFeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CveFeedError::Decode(err.to_string())
        } else {
            CveFeedError::Transient(err.to_string())
        }
    }
}

/// One page request over a `lastMod` window.
#[derive(Debug, Clone, PartialEq)]
pub struct CvePageRequest {
    pub api_url: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub start_index: i64,
    pub results_per_page: i64,
}

impl CvePageRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("lastModStartDate", feed_timestamp(self.window_start)),
            ("lastModEndDate", feed_timestamp(self.window_end)),
            ("startIndex", self.start_index.to_string()),
            ("resultsPerPage", self.results_per_page.to_string()),
        ]
    }
}

fn feed_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A page of results. Items are kept raw for [`super::extract::extract_cve`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvePage {
    #[serde(default)]
    pub total_results: i64,
    #[serde(default)]
    pub results_per_page: i64,
    #[serde(default)]
    pub start_index: i64,
    #[serde(default)]
    pub vulnerabilities: Vec<serde_json::Value>,
}

/// HTTP client for the NVD CVE API.
pub struct NvdClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl NvdClient {
    pub fn new(timeout: Duration, user_agent: &str, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self { http, api_key })
    }
}

#[async_trait]
impl BaseCveFeed for NvdClient {
    async fn fetch_page(&self, request: &CvePageRequest) -> Result<CvePage, CveFeedError> {
        let mut builder = self.http.get(&request.api_url).query(&request.query());
        if let Some(key) = &self.api_key {
            builder = builder.header("apiKey", key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CveFeedError::from_status(status, body));
        }

        // A body cut short is a transport failure; only malformed JSON is a decode error.
        let body = response
            .bytes()
            .await
            .map_err(|e| CveFeedError::Transient(e.to_string()))?;
        let page: CvePage =
            serde_json::from_slice(&body).map_err(|e| CveFeedError::Decode(e.to_string()))?;

        debug!(
            start_index = request.start_index,
            total_results = page.total_results,
            items = page.vulnerabilities.len(),
            "fetched CVE feed page"
        );
        Ok(page)
    }
}
