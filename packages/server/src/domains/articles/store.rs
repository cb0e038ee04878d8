use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{Article, ArticleSummary};
use crate::kernel::store::PostgresStore;

const ARTICLE_COLUMNS: &str = "id, source_id, stable_id, url, title, published_at, summary, \
     content_text, content_fetched_at, summary_llm, summary_bullets, summary_why, summary_cves, \
     summary_model, summarized_at, markdown_path, created_at";

#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert unless `(source_id, stable_id)` already exists.
    ///
    /// Returns the stored row when newly inserted, `None` on a duplicate.
    async fn insert_article_if_new(&self, article: &Article) -> Result<Option<Article>>;

    async fn get_article(&self, article_id: Uuid) -> Result<Option<Article>>;

    async fn get_article_by_stable_id(
        &self,
        source_id: &str,
        stable_id: &str,
    ) -> Result<Option<Article>>;

    /// Newest first.
    async fn list_articles(&self, source_id: Option<&str>, limit: i64) -> Result<Vec<Article>>;

    async fn set_article_content(
        &self,
        article_id: Uuid,
        content_text: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_article_summary(
        &self,
        article_id: Uuid,
        summary: &ArticleSummary,
        summarized_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_article_markdown_path(&self, article_id: Uuid, path: &str) -> Result<()>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[async_trait]
impl ArticleStore for PostgresStore {
    async fn insert_article_if_new(&self, article: &Article) -> Result<Option<Article>> {
        let sql = format!(
            r#"
            INSERT INTO articles (id, source_id, stable_id, url, title, published_at, summary,
                                  created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_id, stable_id) DO NOTHING
            RETURNING {ARTICLE_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Article>(&sql)
            .bind(article.id)
            .bind(&article.source_id)
            .bind(&article.stable_id)
            .bind(&article.url)
            .bind(&article.title)
            .bind(article.published_at)
            .bind(&article.summary)
            .bind(article.created_at)
            .fetch_optional(self.pool())
            .await?;
        Ok(inserted)
    }

    async fn get_article(&self, article_id: Uuid) -> Result<Option<Article>> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1");
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(article_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(article)
    }

    async fn get_article_by_stable_id(
        &self,
        source_id: &str,
        stable_id: &str,
    ) -> Result<Option<Article>> {
        let sql = format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE source_id = $1 AND stable_id = $2"
        );
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(source_id)
            .bind(stable_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(article)
    }

    async fn list_articles(&self, source_id: Option<&str>, limit: i64) -> Result<Vec<Article>> {
        let sql = format!(
            r#"
            SELECT {ARTICLE_COLUMNS} FROM articles
            WHERE ($1::text IS NULL OR source_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#
        );
        let articles = sqlx::query_as::<_, Article>(&sql)
            .bind(source_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(articles)
    }

    async fn set_article_content(
        &self,
        article_id: Uuid,
        content_text: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE articles SET content_text = $2, content_fetched_at = $3 WHERE id = $1")
            .bind(article_id)
            .bind(content_text)
            .bind(fetched_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn set_article_summary(
        &self,
        article_id: Uuid,
        summary: &ArticleSummary,
        summarized_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE articles
            SET summary_llm = $2, summary_bullets = $3, summary_why = $4, summary_cves = $5,
                summary_model = $6, summarized_at = $7
            WHERE id = $1
            "#,
        )
        .bind(article_id)
        .bind(&summary.summary)
        .bind(serde_json::to_value(&summary.bullets)?)
        .bind(&summary.why)
        .bind(&summary.cves)
        .bind(&summary.model)
        .bind(summarized_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn set_article_markdown_path(&self, article_id: Uuid, path: &str) -> Result<()> {
        sqlx::query("UPDATE articles SET markdown_path = $2 WHERE id = $1")
            .bind(article_id)
            .bind(path)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
