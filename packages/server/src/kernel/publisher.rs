//! Markdown publisher: one file per article under the site content dir.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::BasePublisher;
use crate::domains::articles::Article;
use crate::domains::sources::Source;

const STABLE_ID_PREFIX_LEN: usize = 12;

/// YAML header of an article file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontMatter {
    pub title: String,
    pub date: DateTime<Utc>,
    pub source: String,
    pub source_id: String,
    pub url: String,
    pub stable_id: String,
    pub tags: Vec<String>,
    pub cves: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,
}

pub struct MarkdownPublisher {
    content_dir: PathBuf,
}

impl MarkdownPublisher {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// `<date>-<stable_id prefix>.md`, dated by publication or first sight.
    pub fn file_name(article: &Article) -> String {
        let date = article.published_at.unwrap_or(article.created_at);
        let prefix: String = article.stable_id.chars().take(STABLE_ID_PREFIX_LEN).collect();
        format!("{}-{}.md", date.format("%Y-%m-%d"), prefix)
    }

    pub fn front_matter(article: &Article, source: &Source) -> FrontMatter {
        FrontMatter {
            title: article.title.clone(),
            date: article.published_at.unwrap_or(article.created_at),
            source: source.name.clone(),
            source_id: source.id.clone(),
            url: article.url.clone(),
            stable_id: article.stable_id.clone(),
            tags: source.tags.clone(),
            cves: article.summary_cves.clone().unwrap_or_default(),
            summary_model: article.summary_model.clone(),
        }
    }

    pub fn render(article: &Article, source: &Source) -> Result<String> {
        let front_matter = serde_yaml::to_string(&Self::front_matter(article, source))
            .context("Failed to serialize front matter")?;

        let mut out = String::from("---\n");
        out.push_str(&front_matter);
        out.push_str("---\n\n");

        match article.summary_llm.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(summary) => {
                out.push_str(summary.trim());
                out.push_str("\n\n");

                let bullets: Vec<String> = article
                    .summary_bullets
                    .as_ref()
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
                    .unwrap_or_default();
                for bullet in &bullets {
                    out.push_str(&format!("- {}\n", bullet.trim()));
                }
                if !bullets.is_empty() {
                    out.push('\n');
                }

                if let Some(why) = &article.summary_why {
                    out.push_str(&format!("**Why it matters:** {}\n\n", why.trim()));
                }
            }
            None => {
                let text = article.best_text().trim();
                if !text.is_empty() {
                    out.push_str(text);
                    out.push_str("\n\n");
                }
            }
        }

        out.push_str(&format!("[Read the original]({})\n", article.url));
        Ok(out)
    }
}

#[async_trait]
impl BasePublisher for MarkdownPublisher {
    async fn write_article(&self, article: &Article, source: &Source) -> Result<String> {
        tokio::fs::create_dir_all(&self.content_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.content_dir.display()))?;

        let path = self.content_dir.join(Self::file_name(article));
        let rendered = Self::render(article, source)?;

        // Written aside and renamed, so the site never sees a half-written file.
        let tmp = path.with_extension("md.tmp");
        tokio::fs::write(&tmp, rendered)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move {} into place", path.display()))?;

        debug!(article_id = %article.id, path = %path.display(), "article markdown written");
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixture() -> (Article, Source) {
        let mut source = Source::new("src-1", "Example \"News\"", "https://news.example/");
        source.tags = vec!["ransomware".into()];
        let mut article = Article::new(
            "src-1",
            "https://news.example/story",
            "Widget: a bug",
            Some(Utc.with_ymd_and_hms(2024, 5, 14, 9, 30, 0).unwrap()),
            Some("Teaser".into()),
        )
        .unwrap();
        article.content_text = Some("Full body".into());
        (article, source)
    }

    #[test]
    fn file_name_is_date_and_stable_prefix() {
        let (article, _) = fixture();
        let name = MarkdownPublisher::file_name(&article);
        assert_eq!(name, format!("2024-05-14-{}.md", &article.stable_id[..12]));
    }

    fn split(md: &str) -> (FrontMatter, &str) {
        let rest = md.strip_prefix("---\n").unwrap();
        let end = rest.find("\n---\n").unwrap();
        let front_matter = serde_yaml::from_str(&rest[..end]).unwrap();
        (front_matter, &rest[end + 5..])
    }

    #[test]
    fn render_without_summary_uses_content() {
        let (article, source) = fixture();
        let md = MarkdownPublisher::render(&article, &source).unwrap();
        let (front_matter, body) = split(&md);

        assert_eq!(front_matter, MarkdownPublisher::front_matter(&article, &source));
        assert_eq!(front_matter.title, "Widget: a bug");
        assert_eq!(front_matter.source, "Example \"News\"");
        assert_eq!(front_matter.tags, vec!["ransomware".to_string()]);
        assert!(front_matter.cves.is_empty());
        assert!(!md.contains("summary_model"));
        assert!(body.contains("Full body"));
    }

    #[test]
    fn render_with_summary() {
        let (mut article, source) = fixture();
        article.summary_llm = Some("Short take.".into());
        article.summary_bullets = Some(serde_json::json!(["one", "two"]));
        article.summary_why = Some("Patch now.".into());
        article.summary_cves = Some(vec!["CVE-2024-1".into()]);
        article.summary_model = Some("gpt-5-mini".into());

        let md = MarkdownPublisher::render(&article, &source).unwrap();
        let (front_matter, body) = split(&md);
        assert_eq!(front_matter.cves, vec!["CVE-2024-1".to_string()]);
        assert_eq!(front_matter.summary_model.as_deref(), Some("gpt-5-mini"));
        assert!(body.contains("Short take.\n\n- one\n- two\n"));
        assert!(body.contains("**Why it matters:** Patch now."));
        assert!(!body.contains("Full body"));
    }

    #[tokio::test]
    async fn rewriting_overwrites_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = MarkdownPublisher::new(dir.path().join("posts"));
        let (mut article, source) = fixture();

        let first = publisher.write_article(&article, &source).await.unwrap();
        article.title = "Updated title".into();
        let second = publisher.write_article(&article, &source).await.unwrap();

        assert_eq!(first, second);
        let written = std::fs::read_to_string(&second).unwrap();
        assert!(written.contains("Updated title"));
        assert_eq!(std::fs::read_dir(dir.path().join("posts")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn leftover_partial_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = MarkdownPublisher::new(dir.path());
        let (article, source) = fixture();

        // Left behind by a write that died halfway
        let name = MarkdownPublisher::file_name(&article);
        std::fs::write(dir.path().join(format!("{name}.tmp")), "---\ntitle: trunc").unwrap();

        let path = publisher.write_article(&article, &source).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(split(&written).0.stable_id, article.stable_id);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![name]);
    }
}
