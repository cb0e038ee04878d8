use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::kernel::jobs::JobType;

pub const DEFAULT_USER_AGENT: &str = concat!("vulnwatch/", env!("CARGO_PKG_VERSION"));

/// Process configuration loaded from environment variables.
///
/// Pipeline knobs that may change at runtime live in the settings table
/// instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub worker_id: String,
    pub poll_interval_secs: u64,
    pub lease_timeout_secs: i64,
    /// Restrict this worker to these job types (all when unset)
    pub job_types: Option<Vec<JobType>>,
    pub scheduler_enabled: bool,
    pub http_timeout_secs: u64,
    pub http_user_agent: String,
    pub site_dir: String,
    pub site_content_dir: String,
    pub site_build_command: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub nvd_api_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            worker_id: env::var("WORKER_ID")
                .unwrap_or_else(|_| format!("worker-{}", std::process::id())),
            poll_interval_secs: parse_var("WORKER_POLL_INTERVAL_SECS", 2)?,
            lease_timeout_secs: parse_var("WORKER_LEASE_TIMEOUT_SECS", 900)?,
            job_types: optional_var("WORKER_JOB_TYPES")
                .map(|raw| parse_job_types(&raw))
                .transpose()?,
            scheduler_enabled: parse_var("SCHEDULER_ENABLED", false)?,
            http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS", 30)?,
            http_user_agent: env::var("HTTP_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            site_dir: env::var("SITE_DIR").unwrap_or_else(|_| "site".to_string()),
            site_content_dir: env::var("SITE_CONTENT_DIR")
                .unwrap_or_else(|_| "site/content/posts".to_string()),
            site_build_command: env::var("SITE_BUILD_COMMAND")
                .unwrap_or_else(|_| "hugo".to_string()),
            openai_api_key: optional_var("OPENAI_API_KEY"),
            openai_base_url: optional_var("OPENAI_BASE_URL"),
            nvd_api_key: optional_var("NVD_API_KEY"),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lease_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Unset and blank variables are both `None`.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a valid value, got {raw:?}")),
        None => Ok(default),
    }
}

/// Parse a comma-separated job type list such as `ingest_source,cve_sync`.
pub fn parse_job_types(raw: &str) -> Result<Vec<JobType>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| JobType::from_str(s).map_err(anyhow::Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_list_parses() {
        let types = parse_job_types(" ingest_source, cve_sync ,").unwrap();
        assert_eq!(types, vec![JobType::IngestSource, JobType::CveSync]);
    }

    #[test]
    fn unknown_job_type_is_rejected() {
        let err = parse_job_types("ingest_source,send_email").unwrap_err();
        assert!(err.to_string().contains("send_email"));
    }
}
