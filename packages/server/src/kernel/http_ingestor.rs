//! HTTP collaborators for the news pipeline.
//!
//! - [`HttpIngestor`] polls a source's listing page and returns same-host
//!   links as candidate articles
//! - [`HttpContentFetcher`] fetches one article page and converts its main
//!   content to markdown
//!
//! Both use reqwest for HTTP, scraper for HTML parsing and htmd for the
//! markdown conversion. No JavaScript rendering.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use super::{BaseContentFetcher, BaseSourceIngestor, IngestDecision, IngestedArticle, SourceResult};
use crate::common::utils::normalize_url;
use crate::domains::sources::{RunStatus, Source};

/// Anchor text shorter than this is navigation, not a headline.
const MIN_TITLE_CHARS: usize = 12;

fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .context("Failed to create HTTP client")
}

/// Outcome of a page fetch that did not fail at the transport level.
enum Fetched {
    Html(String),
    Status(u16),
}

async fn fetch_html(client: &reqwest::Client, url: &str) -> Result<Fetched> {
    let response = client.get(url).send().await.context("HTTP request failed")?;

    let status = response.status();
    if !status.is_success() {
        return Ok(Fetched::Status(status.as_u16()));
    }

    let body = response
        .text()
        .await
        .context("Failed to read response body")?;
    Ok(Fetched::Html(body))
}

// =============================================================================
// Ingestor
// =============================================================================

/// Listing-page ingestor for `html` sources.
pub struct HttpIngestor {
    client: reqwest::Client,
}

impl HttpIngestor {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, user_agent)?,
        })
    }

    /// Turn a listing page into candidates, recording a decision for every
    /// link considered.
    pub fn collect_candidates(html: &str, base_url: &Url) -> SourceResult {
        let document = Html::parse_document(html);
        let mut result = SourceResult::ok(Vec::new());
        let Ok(link_selector) = Selector::parse("a[href]") else {
            return result;
        };

        let base_host = base_url.host_str().unwrap_or("");
        let base_normalized = normalize_url(base_url.as_str()).ok();
        let mut seen: HashSet<String> = HashSet::new();

        for element in document.select(&link_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(url) = base_url.join(href) else {
                continue;
            };
            if url.scheme() != "http" && url.scheme() != "https" {
                continue;
            }
            if url.host_str() != Some(base_host) {
                continue;
            }

            let Ok(normalized) = normalize_url(url.as_str()) else {
                continue;
            };
            if Some(&normalized) == base_normalized.as_ref() || !seen.insert(normalized) {
                continue;
            }

            result.found_count += 1;
            let link = url.to_string();

            if is_skip_path(url.path()) {
                result.skipped_filtered += 1;
                result.decisions.push(IngestDecision::new(
                    link,
                    "filtered",
                    Some("non-article path".into()),
                ));
                continue;
            }

            let title = element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if title.chars().count() < MIN_TITLE_CHARS {
                result.skipped_invalid += 1;
                result.decisions.push(IngestDecision::new(
                    link,
                    "invalid",
                    Some("missing or short title".into()),
                ));
                continue;
            }

            result
                .decisions
                .push(IngestDecision::new(link.clone(), "accepted", None));
            result.articles.push(IngestedArticle {
                url: link,
                title,
                published_at: None,
                summary: None,
            });
        }

        result.accepted_count = result.articles.len() as i32;
        result
    }
}

/// Paths that never hold articles (assets, auth, feeds, taxonomy pages).
fn is_skip_path(path: &str) -> bool {
    let skip_patterns = [
        "/wp-admin",
        "/wp-login",
        "/login",
        "/logout",
        "/signin",
        "/signup",
        "/auth",
        "/cdn-cgi/",
        "/feed",
        "/rss",
        "/sitemap",
        "/tag/",
        "/category/",
        "/author/",
        "/page/",
        ".pdf",
        ".jpg",
        ".jpeg",
        ".png",
        ".gif",
        ".svg",
        ".css",
        ".js",
        ".xml",
        ".json",
    ];

    let path_lower = path.to_lowercase();
    path_lower == "/"
        || skip_patterns
            .iter()
            .any(|pattern| path_lower.contains(pattern))
}

#[async_trait]
impl BaseSourceIngestor for HttpIngestor {
    async fn ingest(&self, source: &Source) -> Result<SourceResult> {
        let base_url = match Url::parse(&source.url) {
            Ok(url) => url,
            Err(e) => return Ok(SourceResult::error(None, format!("invalid source URL: {e}"))),
        };

        debug!(source_id = %source.id, url = %base_url, "polling source");

        let html = match fetch_html(&self.client, base_url.as_str()).await {
            Ok(Fetched::Html(html)) => html,
            Ok(Fetched::Status(status)) => {
                return Ok(SourceResult::error(
                    Some(i32::from(status)),
                    format!("HTTP {status} for {base_url}"),
                ))
            }
            Err(e) => return Ok(SourceResult::error(None, format!("{e:#}"))),
        };

        let mut result = Self::collect_candidates(&html, &base_url);
        result.http_status = Some(200);

        info!(
            source_id = %source.id,
            found = result.found_count,
            accepted = result.accepted_count,
            status = %RunStatus::Ok,
            "source polled"
        );
        Ok(result)
    }
}

// =============================================================================
// Content fetcher
// =============================================================================

pub struct HttpContentFetcher {
    client: reqwest::Client,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, user_agent)?,
        })
    }

    /// Main content of a page as markdown.
    pub fn page_to_markdown(html: &str) -> String {
        let document = Html::parse_document(html);
        let main_content = extract_main_content(&document);
        html_to_markdown(&main_content).trim().to_string()
    }
}

#[async_trait]
impl BaseContentFetcher for HttpContentFetcher {
    async fn fetch_content(&self, url: &str) -> Result<String> {
        match fetch_html(&self.client, url).await? {
            Fetched::Html(html) => Ok(Self::page_to_markdown(&html)),
            Fetched::Status(status) => anyhow::bail!("HTTP {} for {}", status, url),
        }
    }
}

/// Extract main content HTML, falling back to the body without boilerplate.
fn extract_main_content(document: &Html) -> String {
    let main_selectors = [
        "article",
        "main",
        "[role='main']",
        ".post-content",
        ".entry-content",
        "#content",
        ".content",
    ];

    for selector_str in main_selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(main) = document.select(&selector).next() {
                return remove_boilerplate(&main.html());
            }
        }
    }

    if let Ok(body_selector) = Selector::parse("body") {
        if let Some(body) = document.select(&body_selector).next() {
            return remove_boilerplate(&body.html());
        }
    }

    document.html()
}

fn remove_boilerplate(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let unwanted = [
        "nav", "header", "footer", "aside", "script", "style", "noscript", "iframe", "form",
        ".sidebar", ".share", ".related", ".comments",
    ];

    let mut result = html.to_string();
    for selector_str in unwanted {
        if let Ok(selector) = Selector::parse(selector_str) {
            for element in fragment.select(&selector) {
                result = result.replace(&element.html(), "");
            }
        }
    }
    result
}

fn html_to_markdown(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| {
        // Fallback: strip tags and return plain text
        let document = Html::parse_fragment(html);
        document.root_element().text().collect::<String>()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <nav><a href="/">Home</a><a href="/login">Log in</a></nav>
          <h2><a href="/2024/05/new-ransomware-strain-hits-hospitals/">New ransomware strain hits hospitals</a></h2>
          <h2><a href="https://news.example/2024/05/patch-tuesday-fixes-zero-days?utm_source=home">Patch Tuesday fixes three zero-days</a></h2>
          <a href="/2024/05/patch-tuesday-fixes-zero-days">Patch Tuesday fixes three zero-days</a>
          <a href="/2024/05/short">More</a>
          <a href="https://other.example/story">Off-site story that is long enough</a>
          <a href="/tag/ransomware/">Ransomware tag archive page</a>
          <a href="mailto:tips@news.example">Send us a tip by email please</a>
        </body></html>
    "#;

    #[test]
    fn collects_same_host_article_links() {
        let base = Url::parse("https://news.example/").unwrap();
        let result = HttpIngestor::collect_candidates(LISTING, &base);

        let urls: Vec<&str> = result.articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://news.example/2024/05/new-ransomware-strain-hits-hospitals/",
                "https://news.example/2024/05/patch-tuesday-fixes-zero-days?utm_source=home",
            ]
        );
        assert_eq!(result.articles[1].title, "Patch Tuesday fixes three zero-days");
        assert_eq!(result.accepted_count, 2);
        assert_eq!(result.status, RunStatus::Ok);
    }

    #[test]
    fn counts_skips_with_decisions() {
        let base = Url::parse("https://news.example/").unwrap();
        let result = HttpIngestor::collect_candidates(LISTING, &base);

        // /login and /tag/ are filtered, /2024/05/short has no usable title
        assert_eq!(result.skipped_filtered, 2);
        assert_eq!(result.skipped_invalid, 1);
        assert_eq!(result.found_count, 5);
        assert!(result
            .decisions
            .iter()
            .any(|d| d.decision == "invalid" && d.url.ends_with("/2024/05/short")));
    }

    #[test]
    fn test_is_skip_path() {
        assert!(is_skip_path("/wp-admin/"));
        assert!(is_skip_path("/image.jpg"));
        assert!(is_skip_path("/"));
        assert!(!is_skip_path("/2024/05/some-story"));
    }

    #[test]
    fn page_to_markdown_prefers_article_body() {
        let html = r#"<html><body><nav>Menu</nav><article><h1>Hello</h1><p>World</p><aside>Ad</aside></article></body></html>"#;
        let md = HttpContentFetcher::page_to_markdown(html);
        assert!(md.contains("Hello"));
        assert!(md.contains("World"));
        assert!(!md.contains("Menu"));
        assert!(!md.contains("Ad"));
    }
}
