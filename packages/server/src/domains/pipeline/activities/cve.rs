use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;

use crate::domains::cve::{run_cve_sync, CveSyncReport};
use crate::domains::pipeline::jobs::CveSyncJob;
use crate::kernel::ServerDeps;

/// Run one CVE sync pass. Items already processed stay committed when a
/// page fails; the job still fails so the error is visible on the row.
pub async fn cve_sync(job: CveSyncJob, deps: Arc<ServerDeps>) -> Result<CveSyncReport> {
    let report = run_cve_sync(
        deps.cve_feed.as_ref(),
        deps.cves.as_ref(),
        deps.settings.as_ref(),
        job.since,
        Utc::now(),
    )
    .await?;

    if report.errors > 0 {
        bail!(
            "CVE sync incomplete: {} page error(s) after {} page(s), {} upserted",
            report.errors,
            report.pages,
            report.upserted
        );
    }
    Ok(report)
}
