//! Runtime settings stored as JSON values keyed by name.
//!
//! Handlers read these at execution time, so a change takes effect on the
//! next job without restarting workers.

mod store;

pub use store::{SettingsStore, SettingsStoreExt};

/// Whether ingest chains into content fetching (bool, default true).
pub const PIPELINE_FETCH_FULL_CONTENT: &str = "pipeline.fetch_full_content";
/// LLM summarization route (`{enabled, provider, model}`).
pub const LLM_SUMMARIZE: &str = "llm.summarize";
/// CVE sync options, see [`crate::domains::cve::CveSyncSettings`].
pub const CVE_SYNC: &str = "cve.sync";
/// Watermark of the last sync that finished without page errors.
pub const CVE_LAST_SUCCESSFUL_SYNC_AT: &str = "cve.last_successful_sync_at";
pub const HEALTH_ERROR_THRESHOLD: &str = "health.error_threshold";
pub const HEALTH_ZERO_THRESHOLD: &str = "health.zero_threshold";
pub const HEALTH_PAUSE_MINUTES: &str = "health.pause_minutes";
pub const HEALTH_AUTO_PAUSE: &str = "health.auto_pause";
