// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into ServerDeps for tests,
// backed by a shared MemoryStore.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::memory_store::MemoryStore;
use super::{
    BaseContentFetcher, BaseCveFeed, BasePublisher, BaseSiteBuilder, BaseSourceIngestor,
    BaseSummarizer, IngestedArticle, ServerDeps, SourceResult, SummaryRequest,
};
use crate::domains::articles::{Article, ArticleSummary};
use crate::domains::cve::{CveFeedError, CvePage, CvePageRequest};
use crate::domains::sources::Source;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Mock Source Ingestor
// =============================================================================

pub struct MockIngestor {
    results: Arc<Mutex<HashMap<String, Vec<SourceResult>>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockIngestor {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a result for the next poll of `source_id`
    pub fn with_result(self, source_id: &str, result: SourceResult) -> Self {
        locked(&self.results)
            .entry(source_id.to_string())
            .or_default()
            .push(result);
        self
    }

    /// Queue an ok result carrying articles built from (url, title) pairs
    pub fn with_articles(self, source_id: &str, articles: Vec<(&str, &str)>) -> Self {
        let articles = articles
            .into_iter()
            .map(|(url, title)| IngestedArticle {
                url: url.to_string(),
                title: title.to_string(),
                published_at: None,
                summary: Some(format!("Teaser for {title}")),
            })
            .collect();
        self.with_result(source_id, SourceResult::ok(articles))
    }

    /// Make every poll of `source_id` return `Err`
    pub fn with_failure(self, source_id: &str, error: &str) -> Self {
        locked(&self.failures).insert(source_id.to_string(), error.to_string());
        self
    }

    /// Source ids polled, in order
    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }
}

impl Default for MockIngestor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSourceIngestor for MockIngestor {
    async fn ingest(&self, source: &Source) -> Result<SourceResult> {
        locked(&self.calls).push(source.id.clone());

        if let Some(error) = locked(&self.failures).get(&source.id) {
            return Err(anyhow!(error.clone()));
        }

        let mut results = locked(&self.results);
        match results.get_mut(&source.id) {
            Some(queue) if !queue.is_empty() => Ok(queue.remove(0)),
            // Nothing queued: an ok poll that found nothing
            _ => Ok(SourceResult::ok(Vec::new())),
        }
    }
}

// =============================================================================
// Mock Content Fetcher
// =============================================================================

pub struct MockContentFetcher {
    pages: Arc<Mutex<HashMap<String, String>>>,
    failing_urls: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockContentFetcher {
    pub fn new() -> Self {
        Self {
            pages: Arc::new(Mutex::new(HashMap::new())),
            failing_urls: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_page(self, url: &str, content: &str) -> Self {
        locked(&self.pages).insert(url.to_string(), content.to_string());
        self
    }

    pub fn with_failure(self, url: &str) -> Self {
        locked(&self.failing_urls).push(url.to_string());
        self
    }

    /// Get all URLs that were fetched
    pub fn calls(&self) -> Vec<String> {
        locked(&self.calls).clone()
    }
}

impl Default for MockContentFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseContentFetcher for MockContentFetcher {
    async fn fetch_content(&self, url: &str) -> Result<String> {
        locked(&self.calls).push(url.to_string());

        if locked(&self.failing_urls).iter().any(|u| u == url) {
            return Err(anyhow!("HTTP 503 for {url}"));
        }

        Ok(locked(&self.pages)
            .get(url)
            .cloned()
            .unwrap_or_else(|| format!("# Mock Content\n\nFull text of {url}.")))
    }
}

// =============================================================================
// Mock Summarizer (LLM)
// =============================================================================

pub struct MockSummarizer {
    responses: Arc<Mutex<Vec<ArticleSummary>>>,
    calls: Arc<Mutex<Vec<SummaryRequest>>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a summary to the response queue
    pub fn with_response(self, summary: ArticleSummary) -> Self {
        locked(&self.responses).push(summary);
        self
    }

    pub fn calls(&self) -> Vec<SummaryRequest> {
        locked(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSummarizer for MockSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<ArticleSummary> {
        locked(&self.calls).push(request.clone());

        let mut responses = locked(&self.responses);
        if !responses.is_empty() {
            return Ok(responses.remove(0));
        }

        Ok(ArticleSummary {
            summary: format!("Mock summary of {}", request.title),
            bullets: vec!["mock bullet".to_string()],
            why: Some("mock reason".to_string()),
            cves: Vec::new(),
            model: request.model.clone().unwrap_or_else(|| "mock-model".to_string()),
        })
    }
}

// =============================================================================
// Mock Publisher
// =============================================================================

/// Arguments captured from a write_article call
#[derive(Debug, Clone)]
pub struct PublishCall {
    pub article_id: Uuid,
    pub stable_id: String,
    pub source_id: String,
    pub had_llm_summary: bool,
}

pub struct MockPublisher {
    calls: Arc<Mutex<Vec<PublishCall>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<PublishCall> {
        locked(&self.calls).clone()
    }

    /// Check if an article was written
    pub fn was_written(&self, article_id: Uuid) -> bool {
        locked(&self.calls).iter().any(|c| c.article_id == article_id)
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePublisher for MockPublisher {
    async fn write_article(&self, article: &Article, source: &Source) -> Result<String> {
        locked(&self.calls).push(PublishCall {
            article_id: article.id,
            stable_id: article.stable_id.clone(),
            source_id: source.id.clone(),
            had_llm_summary: article.has_llm_summary(),
        });
        Ok(format!("mock://posts/{}.md", article.stable_id))
    }
}

// =============================================================================
// Mock Site Builder
// =============================================================================

pub struct MockSiteBuilder {
    builds: Arc<Mutex<usize>>,
    fail_with: Option<String>,
}

impl MockSiteBuilder {
    pub fn new() -> Self {
        Self {
            builds: Arc::new(Mutex::new(0)),
            fail_with: None,
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            builds: Arc::new(Mutex::new(0)),
            fail_with: Some(error.to_string()),
        }
    }

    pub fn build_count(&self) -> usize {
        *locked(&self.builds)
    }
}

impl Default for MockSiteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSiteBuilder for MockSiteBuilder {
    async fn build(&self) -> Result<String> {
        *locked(&self.builds) += 1;
        match &self.fail_with {
            Some(error) => Err(anyhow!(error.clone())),
            None => Ok("mock site built".to_string()),
        }
    }
}

// =============================================================================
// Mock CVE Feed
// =============================================================================

pub struct MockCveFeed {
    responses: Arc<Mutex<Vec<Result<CvePage, CveFeedError>>>>,
    requests: Arc<Mutex<Vec<CvePageRequest>>>,
}

impl MockCveFeed {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a page built from raw `vulnerabilities` items
    pub fn with_page(self, total_results: i64, items: Vec<serde_json::Value>) -> Self {
        let page = CvePage {
            total_results,
            results_per_page: items.len() as i64,
            start_index: 0,
            vulnerabilities: items,
        };
        locked(&self.responses).push(Ok(page));
        self
    }

    /// Queue a failure for the next fetch
    pub fn with_error(self, error: CveFeedError) -> Self {
        locked(&self.responses).push(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<CvePageRequest> {
        locked(&self.requests).clone()
    }
}

impl Default for MockCveFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseCveFeed for MockCveFeed {
    async fn fetch_page(&self, request: &CvePageRequest) -> Result<CvePage, CveFeedError> {
        locked(&self.requests).push(request.clone());

        let mut responses = locked(&self.responses);
        if !responses.is_empty() {
            return responses.remove(0).map(|mut page| {
                page.start_index = request.start_index;
                page
            });
        }

        Ok(CvePage {
            total_results: 0,
            results_per_page: 0,
            start_index: request.start_index,
            vulnerabilities: Vec::new(),
        })
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: Arc<MemoryStore>,
    pub ingestor: Arc<MockIngestor>,
    pub content_fetcher: Arc<MockContentFetcher>,
    pub summarizer: Option<Arc<MockSummarizer>>,
    pub publisher: Arc<MockPublisher>,
    pub site_builder: Arc<MockSiteBuilder>,
    pub cve_feed: Arc<MockCveFeed>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            ingestor: Arc::new(MockIngestor::new()),
            content_fetcher: Arc::new(MockContentFetcher::new()),
            summarizer: None,
            publisher: Arc::new(MockPublisher::new()),
            site_builder: Arc::new(MockSiteBuilder::new()),
            cve_feed: Arc::new(MockCveFeed::new()),
        }
    }

    /// Share an existing store
    pub fn with_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn mock_ingestor(mut self, ingestor: MockIngestor) -> Self {
        self.ingestor = Arc::new(ingestor);
        self
    }

    pub fn mock_content_fetcher(mut self, fetcher: MockContentFetcher) -> Self {
        self.content_fetcher = Arc::new(fetcher);
        self
    }

    /// Configure a summarizer (none by default, so the LLM stage is off)
    pub fn mock_summarizer(mut self, summarizer: MockSummarizer) -> Self {
        self.summarizer = Some(Arc::new(summarizer));
        self
    }

    pub fn mock_site_builder(mut self, builder: MockSiteBuilder) -> Self {
        self.site_builder = Arc::new(builder);
        self
    }

    pub fn mock_cve_feed(mut self, feed: MockCveFeed) -> Self {
        self.cve_feed = Arc::new(feed);
        self
    }

    /// Convert into ServerDeps for handlers and runners
    pub fn into_deps(self) -> Arc<ServerDeps> {
        let deps = ServerDeps {
            jobs: self.store.clone(),
            settings: self.store.clone(),
            sources: self.store.clone(),
            articles: self.store.clone(),
            cves: self.store.clone(),
            ingestor: self.ingestor,
            content_fetcher: self.content_fetcher,
            summarizer: self
                .summarizer
                .map(|s| s as Arc<dyn BaseSummarizer>),
            publisher: self.publisher,
            site_builder: self.site_builder,
            cve_feed: self.cve_feed,
        };
        Arc::new(deps)
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
