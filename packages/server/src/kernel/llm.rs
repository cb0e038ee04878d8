//! OpenAI chat-completions summarizer.
//!
//! Sends the article text with a JSON response format and parses the reply
//! into an [`ArticleSummary`].

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BaseSummarizer, SummaryRequest};
use crate::domains::articles::ArticleSummary;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Used when the `llm.summarize` route names no model.
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-5-mini";

/// Article text beyond this many characters is cut before sending.
const MAX_CONTENT_CHARS: usize = 12_000;

const SYSTEM_PROMPT: &str = "You summarize security news for practitioners. \
Reply with a JSON object: {\"summary\": string (2-3 sentences), \
\"bullets\": array of up to 5 short strings, \
\"why\": string (why it matters to defenders), \
\"cves\": array of CVE identifiers mentioned in the text}.";

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// The JSON object the model is asked to return.
#[derive(Debug, Deserialize)]
struct SummaryPayload {
    summary: String,
    #[serde(default)]
    bullets: Vec<String>,
    #[serde(default)]
    why: Option<String>,
    #[serde(default)]
    cves: Vec<String>,
}

#[derive(Clone)]
pub struct OpenAiSummarizer {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiSummarizer {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        })
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(request: &SummaryRequest) -> ChatRequest {
        let content: String = request.content.chars().take(MAX_CONTENT_CHARS).collect();
        let user_prompt = format!(
            "Title: {}\nSource: {}\nURL: {}\n\n{}",
            request.title, request.source, request.url, content
        );

        ChatRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string()),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }
}

/// Parse the model's reply. Tolerates a fenced code block around the JSON.
fn parse_summary(content: &str, model: &str) -> Result<ArticleSummary> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let payload: SummaryPayload =
        serde_json::from_str(json).context("Failed to parse summary JSON")?;
    if payload.summary.trim().is_empty() {
        return Err(anyhow!("summary is empty"));
    }

    Ok(ArticleSummary {
        summary: payload.summary.trim().to_string(),
        bullets: payload.bullets,
        why: payload.why.filter(|why| !why.trim().is_empty()),
        cves: payload
            .cves
            .into_iter()
            .map(|cve| cve.trim().to_uppercase())
            .filter(|cve| cve.starts_with("CVE-"))
            .collect(),
        model: model.to_string(),
    })
}

#[async_trait]
impl BaseSummarizer for OpenAiSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<ArticleSummary> {
        let start = std::time::Instant::now();
        let chat_request = Self::build_request(request);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "OpenAI request failed");
                anyhow!("OpenAI request failed: {e}")
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(anyhow!("OpenAI API error ({status}): {error_text}"));
        }

        let chat_response: ChatResponseRaw = response
            .json()
            .await
            .context("Failed to decode OpenAI response")?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response from OpenAI"))?;

        debug!(
            model = %chat_request.model,
            duration_ms = start.elapsed().as_millis(),
            "OpenAI summary"
        );

        parse_summary(&content, &chat_request.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: Option<&str>) -> SummaryRequest {
        SummaryRequest {
            title: "Bug in widget".into(),
            source: "Example News".into(),
            url: "https://news.example/widget".into(),
            content: "x".repeat(MAX_CONTENT_CHARS + 500),
            model: model.map(String::from),
        }
    }

    #[test]
    fn test_client_builder() {
        let client = OpenAiSummarizer::new("sk-test", Duration::from_secs(5))
            .unwrap()
            .with_base_url("https://custom.api.com/v1/");
        assert_eq!(client.base_url(), "https://custom.api.com/v1");
    }

    #[test]
    fn request_uses_route_model_and_json_format() {
        let body = serde_json::to_value(OpenAiSummarizer::build_request(&request(Some(
            "gpt-5",
        ))))
        .unwrap();
        assert_eq!(body["model"], "gpt-5");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");

        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.starts_with("Title: Bug in widget"));
        assert!(user.len() < MAX_CONTENT_CHARS + 200);
    }

    #[test]
    fn request_falls_back_to_default_model() {
        let chat = OpenAiSummarizer::build_request(&request(None));
        assert_eq!(chat.model, DEFAULT_SUMMARY_MODEL);
    }

    #[test]
    fn parses_fenced_reply() {
        let reply = "```json\n{\"summary\": \" A flaw. \", \"bullets\": [\"patch now\"], \"why\": \"\", \"cves\": [\"cve-2024-1234\", \"n/a\"]}\n```";
        let summary = parse_summary(reply, "gpt-5-mini").unwrap();
        assert_eq!(summary.summary, "A flaw.");
        assert_eq!(summary.bullets, vec!["patch now"]);
        assert_eq!(summary.why, None);
        assert_eq!(summary.cves, vec!["CVE-2024-1234"]);
        assert_eq!(summary.model, "gpt-5-mini");
    }

    #[test]
    fn rejects_empty_summary() {
        assert!(parse_summary("{\"summary\": \"  \"}", "m").is_err());
        assert!(parse_summary("not json", "m").is_err());
    }
}
