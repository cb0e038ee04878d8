//! Articles domain - deduplicated content items and their enrichment columns.

pub mod models;
mod store;

pub use models::{Article, ArticleSummary};
pub use store::ArticleStore;
