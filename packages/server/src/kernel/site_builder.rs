use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::BaseSiteBuilder;

/// Output lines kept in the build summary.
const SUMMARY_TAIL_LINES: usize = 5;

/// Runs the static-site generator as a shell command inside the site directory.
pub struct CommandSiteBuilder {
    site_dir: PathBuf,
    command: String,
}

impl CommandSiteBuilder {
    pub fn new(site_dir: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            site_dir: site_dir.into(),
            command: command.into(),
        }
    }
}

fn summarize_output(stdout: &[u8]) -> String {
    let text = String::from_utf8_lossy(stdout);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(SUMMARY_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl BaseSiteBuilder for CommandSiteBuilder {
    async fn build(&self) -> Result<String> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.site_dir)
            .output()
            .await
            .with_context(|| format!("Failed to run site build command `{}`", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Site build failed ({}): {}", output.status, stderr.trim());
        }

        let summary = summarize_output(&output.stdout);
        info!(site_dir = %self.site_dir.display(), "site built");
        Ok(summary)
    }
}
