//! Server dependencies for job handlers (using traits for testability)
//!
//! This module provides the central dependency container handed to every
//! job handler. Storage and external services are trait objects so tests
//! can swap in `MemoryStore` and the mocks from `test_dependencies`.

use std::sync::Arc;

use typed_builder::TypedBuilder;

use crate::domains::articles::ArticleStore;
use crate::domains::cve::CveStore;
use crate::domains::settings::SettingsStore;
use crate::domains::sources::SourceStore;
use crate::kernel::jobs::JobQueue;
use crate::kernel::{
    BaseContentFetcher, BaseCveFeed, BasePublisher, BaseSiteBuilder, BaseSourceIngestor,
    BaseSummarizer,
};

/// Server dependencies accessible to handlers.
#[derive(Clone, TypedBuilder)]
pub struct ServerDeps {
    pub jobs: Arc<dyn JobQueue>,
    pub settings: Arc<dyn SettingsStore>,
    pub sources: Arc<dyn SourceStore>,
    pub articles: Arc<dyn ArticleStore>,
    pub cves: Arc<dyn CveStore>,
    pub ingestor: Arc<dyn BaseSourceIngestor>,
    pub content_fetcher: Arc<dyn BaseContentFetcher>,
    /// LLM summarizer (optional - the summarize stage is skipped without it)
    #[builder(default)]
    pub summarizer: Option<Arc<dyn BaseSummarizer>>,
    pub publisher: Arc<dyn BasePublisher>,
    pub site_builder: Arc<dyn BaseSiteBuilder>,
    pub cve_feed: Arc<dyn BaseCveFeed>,
}
