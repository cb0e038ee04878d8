//! CVE sync engine.
//!
//! One pass pages through the feed over a `lastMod` window, upserts every
//! item that survives the filters, records a snapshot when the scoring state
//! changed, and diffs it against the previous snapshot. The watermark only
//! advances when every page was fetched.

use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::diff::diff_snapshots;
use super::extract::extract_cve;
use super::feed::{CveFeedError, CvePage, CvePageRequest};
use super::filters::CveFilters;
use super::settings::CveSyncSettings;
use super::snapshot::build_snapshot;
use super::store::CveStore;
use crate::domains::settings::{
    SettingsStore, SettingsStoreExt, CVE_LAST_SUCCESSFUL_SYNC_AT, CVE_SYNC,
};
use crate::kernel::BaseCveFeed;

/// Counters for one sync pass; stored as the `cve_sync` job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveSyncReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub pages: u32,
    pub total_results: i64,
    pub seen: u32,
    pub filtered: u32,
    pub invalid: u32,
    pub upserted: u32,
    pub snapshots_inserted: u32,
    pub changes_inserted: u32,
    pub errors: u32,
}

impl CveSyncReport {
    fn new(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            window_start,
            window_end,
            pages: 0,
            total_results: 0,
            seen: 0,
            filtered: 0,
            invalid: 0,
            upserted: 0,
            snapshots_inserted: 0,
            changes_inserted: 0,
            errors: 0,
        }
    }
}

/// `[start, end]` for this pass.
///
/// `start` is the explicit override, else the watermark, else
/// `now - lookback`; it is clamped so the window never exceeds the feed's
/// maximum range.
pub fn sync_window(
    settings: &CveSyncSettings,
    watermark: Option<DateTime<Utc>>,
    since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = now;
    let start = since
        .or(watermark)
        .unwrap_or_else(|| now - settings.lookback());
    let earliest = end - CveSyncSettings::max_window();
    (start.max(earliest).min(end), end)
}

/// Run one sync pass.
pub async fn run_cve_sync(
    feed: &dyn BaseCveFeed,
    cves: &dyn CveStore,
    settings_store: &dyn SettingsStore,
    since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<CveSyncReport> {
    let settings: CveSyncSettings = settings_store
        .get_or(CVE_SYNC, CveSyncSettings::default())
        .await?;
    let watermark: Option<DateTime<Utc>> = settings_store
        .get_or(CVE_LAST_SUCCESSFUL_SYNC_AT, None)
        .await?;
    let filters = CveFilters::from(&settings);

    let (window_start, window_end) = sync_window(&settings, watermark, since, now);
    let mut report = CveSyncReport::new(window_start, window_end);

    info!(
        window_start = %window_start,
        window_end = %window_end,
        filters_active = !filters.is_empty(),
        "starting CVE sync"
    );

    let page_size = settings.page_size();
    let mut start_index = 0i64;

    loop {
        if report.pages > 0 && settings.rate_limit_seconds > 0 {
            tokio::time::sleep(StdDuration::from_secs(settings.rate_limit_seconds)).await;
        }

        let request = CvePageRequest {
            api_url: settings.api_url.clone(),
            window_start,
            window_end,
            start_index,
            results_per_page: page_size,
        };

        let page = match fetch_with_retry(feed, &request, &settings).await {
            Ok(page) => page,
            Err(e) => {
                report.errors += 1;
                error!(start_index, error = %e, "CVE feed page failed; aborting sync");
                break;
            }
        };

        report.pages += 1;
        report.total_results = page.total_results;

        if page.vulnerabilities.is_empty() {
            break;
        }

        for item in &page.vulnerabilities {
            process_item(item, &settings, &filters, cves, now, &mut report).await?;
        }

        let step = if page.results_per_page > 0 {
            page.results_per_page
        } else {
            page_size
        };
        start_index += step;
        if start_index >= page.total_results {
            break;
        }
    }

    if report.errors == 0 {
        settings_store
            .set_typed(CVE_LAST_SUCCESSFUL_SYNC_AT, &window_end)
            .await?;
    } else {
        warn!(errors = report.errors, "CVE sync incomplete; watermark unchanged");
    }

    info!(
        pages = report.pages,
        seen = report.seen,
        filtered = report.filtered,
        invalid = report.invalid,
        upserted = report.upserted,
        snapshots_inserted = report.snapshots_inserted,
        changes_inserted = report.changes_inserted,
        errors = report.errors,
        "CVE sync finished"
    );

    Ok(report)
}

async fn process_item(
    item: &serde_json::Value,
    settings: &CveSyncSettings,
    filters: &CveFilters,
    cves: &dyn CveStore,
    now: DateTime<Utc>,
    report: &mut CveSyncReport,
) -> Result<()> {
    report.seen += 1;

    let Some(cve) = extract_cve(item, settings.prefer_v4) else {
        report.invalid += 1;
        return Ok(());
    };

    if let Err(reason) = filters.check(&cve) {
        report.filtered += 1;
        debug!(cve_id = %cve.cve_id, reason = %reason, "CVE filtered");
        return Ok(());
    }

    cves.upsert_cve(&cve.to_record(now)).await?;
    report.upserted += 1;

    let previous = cves.latest_snapshot(&cve.cve_id).await?;
    let snapshot = build_snapshot(&cve, now);
    let changes = previous
        .map(|previous| diff_snapshots(&previous, &snapshot, now))
        .unwrap_or_default();

    // Snapshot and changes land together, so a rerun never sees one without the other.
    let Some(inserted_changes) = cves.record_snapshot(&snapshot, &changes).await? else {
        return Ok(());
    };
    report.snapshots_inserted += 1;
    report.changes_inserted += inserted_changes as u32;
    if inserted_changes > 0 {
        debug!(cve_id = %cve.cve_id, changes = inserted_changes, "CVE changes detected");
    }

    Ok(())
}

/// Fetch a page, retrying transient failures with linear backoff.
async fn fetch_with_retry(
    feed: &dyn BaseCveFeed,
    request: &CvePageRequest,
    settings: &CveSyncSettings,
) -> Result<CvePage, CveFeedError> {
    let mut attempt = 0u32;
    loop {
        match feed.fetch_page(request).await {
            Ok(page) => return Ok(page),
            Err(e) if e.is_transient() && attempt < settings.max_retries => {
                attempt += 1;
                let delay = settings.backoff_seconds * u64::from(attempt);
                warn!(
                    start_index = request.start_index,
                    attempt,
                    delay_secs = delay,
                    error = %e,
                    "transient CVE feed error; retrying"
                );
                if delay > 0 {
                    tokio::time::sleep(StdDuration::from_secs(delay)).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_defaults_to_lookback() {
        let now = Utc::now();
        let settings = CveSyncSettings::default();
        let (start, end) = sync_window(&settings, None, None, now);
        assert_eq!(end, now);
        assert_eq!(start, now - Duration::hours(24));
    }

    #[test]
    fn window_starts_at_watermark() {
        let now = Utc::now();
        let watermark = now - Duration::hours(3);
        let (start, _) = sync_window(&CveSyncSettings::default(), Some(watermark), None, now);
        assert_eq!(start, watermark);
    }

    #[test]
    fn explicit_since_overrides_watermark() {
        let now = Utc::now();
        let since = now - Duration::days(2);
        let (start, _) = sync_window(
            &CveSyncSettings::default(),
            Some(now - Duration::hours(1)),
            Some(since),
            now,
        );
        assert_eq!(start, since);
    }

    #[test]
    fn window_is_clamped_to_feed_maximum() {
        let now = Utc::now();
        let (start, end) = sync_window(
            &CveSyncSettings::default(),
            Some(now - Duration::days(400)),
            None,
            now,
        );
        assert_eq!(end - start, Duration::days(120));
    }
}
