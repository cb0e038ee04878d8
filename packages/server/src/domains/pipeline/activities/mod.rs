//! Pipeline stage handlers.
//!
//! Each handler takes its typed payload plus the shared dependencies, mutates
//! the store, enqueues the next stage and returns a serializable result.

pub mod article;
pub mod cve;
pub mod ingest;
pub mod site;

pub use article::{fetch_article_content, summarize_article, write_article_markdown, ArticleStageResult};
pub use cve::cve_sync;
pub use ingest::{ingest_due_sources, ingest_source, IngestDueSourcesResult, IngestSourceResult};
pub use site::{build_site, BuildSiteResult};
