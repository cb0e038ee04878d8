use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domains::pipeline::jobs::BuildSiteJob;
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSiteResult {
    pub output: String,
}

pub async fn build_site(_job: BuildSiteJob, deps: Arc<ServerDeps>) -> Result<BuildSiteResult> {
    let output = deps.site_builder.build().await?;
    info!(output = %output, "site built");
    Ok(BuildSiteResult { output })
}
