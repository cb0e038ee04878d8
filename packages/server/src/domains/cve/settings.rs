use chrono::Duration;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NVD_API_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// The feed rejects `lastMod` windows longer than this.
pub const MAX_WINDOW_DAYS: i64 = 120;

/// Options stored under the `cve.sync` setting. Missing keys take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CveSyncSettings {
    pub api_url: String,
    pub results_per_page: i64,
    pub rate_limit_seconds: u64,
    pub max_retries: u32,
    pub backoff_seconds: u64,
    pub lookback_hours: i64,
    pub prefer_v4: bool,
    /// Used by the scheduler; a sync also runs whenever a job is enqueued.
    pub interval_minutes: i64,
    pub min_cvss: Option<f64>,
    pub severities: Vec<String>,
    pub require_known_score: bool,
    pub vendor_keywords: Vec<String>,
    pub product_keywords: Vec<String>,
}

impl Default for CveSyncSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_NVD_API_URL.to_string(),
            results_per_page: 2000,
            rate_limit_seconds: 6,
            max_retries: 3,
            backoff_seconds: 5,
            lookback_hours: 24,
            prefer_v4: true,
            interval_minutes: 60,
            min_cvss: None,
            severities: Vec::new(),
            require_known_score: false,
            vendor_keywords: Vec::new(),
            product_keywords: Vec::new(),
        }
    }
}

impl CveSyncSettings {
    pub fn lookback(&self) -> Duration {
        Duration::hours(self.lookback_hours.max(0))
    }

    pub fn max_window() -> Duration {
        Duration::days(MAX_WINDOW_DAYS)
    }

    /// Page size actually requested; never below one.
    pub fn page_size(&self) -> i64 {
        self.results_per_page.max(1)
    }
}
