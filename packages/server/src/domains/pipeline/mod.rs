//! Chained article pipeline plus the CVE sync and site build entry points.
//!
//! ```text
//! ingest_due_sources ─► ingest_source ─► fetch_article_content ─► summarize_article_llm ─► write_article_markdown
//!
//! fetch disabled: ingest_source ─► write_article_markdown
//! LLM not routed: fetch_article_content ─► write_article_markdown
//!
//! cve_sync, build_site: terminal
//! ```

pub mod activities;
pub mod jobs;
mod registry;
pub mod routing;

pub use jobs::{
    BuildSiteJob, CveSyncJob, FetchArticleContentJob, IngestDueSourcesJob, IngestSourceJob,
    SummarizeArticleJob, WriteArticleMarkdownJob,
};
pub use registry::build_job_registry;
pub use routing::{fetch_full_content, LlmRoute};
