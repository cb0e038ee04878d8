//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod http_ingestor;
pub mod jobs;
pub mod llm;
pub mod memory_store;
pub mod publisher;
pub mod scheduled_tasks;
pub mod site_builder;
pub mod store;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use http_ingestor::{HttpContentFetcher, HttpIngestor};
pub use llm::OpenAiSummarizer;
pub use memory_store::MemoryStore;
pub use publisher::MarkdownPublisher;
pub use site_builder::CommandSiteBuilder;
pub use store::PostgresStore;
pub use test_dependencies::TestDependencies;
pub use traits::*;
