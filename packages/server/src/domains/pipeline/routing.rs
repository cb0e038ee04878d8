//! Chaining decisions read from settings at handler time.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domains::settings::{
    SettingsStore, SettingsStoreExt, LLM_SUMMARIZE, PIPELINE_FETCH_FULL_CONTENT,
};

/// The `llm.summarize` route. Disabled unless configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmRoute {
    pub enabled: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl LlmRoute {
    pub async fn load(settings: &dyn SettingsStore) -> Result<Self> {
        settings.get_or(LLM_SUMMARIZE, Self::default()).await
    }

    /// Routed and enabled: switched on, names a provider, and a summarizer
    /// collaborator exists.
    pub fn is_active(&self, has_summarizer: bool) -> bool {
        self.enabled
            && has_summarizer
            && self
                .provider
                .as_deref()
                .map(|p| !p.trim().is_empty())
                .unwrap_or(false)
    }
}

pub async fn fetch_full_content(settings: &dyn SettingsStore) -> Result<bool> {
    settings.get_or(PIPELINE_FETCH_FULL_CONTENT, true).await
}
