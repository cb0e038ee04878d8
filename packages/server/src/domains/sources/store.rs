use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{HealthAlert, RunStatus, Source, SourceRun};
use crate::kernel::store::PostgresStore;

const SOURCE_COLUMNS: &str = "id, name, enabled, url, kind, interval_minutes, pause_until, \
     paused_reason, tags, last_checked_at, last_ok_at, last_error, created_at, updated_at";

const RUN_COLUMNS: &str = "id, source_id, status, http_status, found_count, accepted_count, \
     skipped_duplicate, skipped_filtered, skipped_old, skipped_invalid, error, decisions, created_at";

/// Sources, their run history and health alerts.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Insert or replace a source's configuration (not its check history).
    async fn upsert_source(&self, source: &Source) -> Result<()>;

    async fn get_source(&self, source_id: &str) -> Result<Option<Source>>;

    async fn list_sources(&self) -> Result<Vec<Source>>;

    /// Enabled, unpaused sources whose interval has elapsed at `now`.
    async fn list_due_sources(&self, now: DateTime<Utc>) -> Result<Vec<Source>>;

    /// Append `run` and stamp the source's check fields from it.
    ///
    /// `last_checked_at` is always set; `last_ok_at` only for ok runs;
    /// `last_error` takes the run's error (cleared on ok).
    async fn record_run(&self, run: &SourceRun) -> Result<()>;

    /// Newest first.
    async fn recent_runs(&self, source_id: &str, limit: i64) -> Result<Vec<SourceRun>>;

    /// Disable the source and pause it until `pause_until`.
    async fn pause_source(
        &self,
        source_id: &str,
        pause_until: DateTime<Utc>,
        reason: &str,
    ) -> Result<()>;

    async fn insert_health_alert(&self, alert: &HealthAlert) -> Result<()>;

    /// Newest first.
    async fn list_health_alerts(&self, limit: i64) -> Result<Vec<HealthAlert>>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[async_trait]
impl SourceStore for PostgresStore {
    async fn upsert_source(&self, source: &Source) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, name, enabled, url, kind, interval_minutes, pause_until,
                                 paused_reason, tags, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                enabled = EXCLUDED.enabled,
                url = EXCLUDED.url,
                kind = EXCLUDED.kind,
                interval_minutes = EXCLUDED.interval_minutes,
                pause_until = EXCLUDED.pause_until,
                paused_reason = EXCLUDED.paused_reason,
                tags = EXCLUDED.tags,
                updated_at = NOW()
            "#,
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(source.enabled)
        .bind(&source.url)
        .bind(&source.kind)
        .bind(source.interval_minutes)
        .bind(source.pause_until)
        .bind(&source.paused_reason)
        .bind(&source.tags)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_source(&self, source_id: &str) -> Result<Option<Source>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1");
        let source = sqlx::query_as::<_, Source>(&sql)
            .bind(source_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(source)
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id");
        let sources = sqlx::query_as::<_, Source>(&sql)
            .fetch_all(self.pool())
            .await?;
        Ok(sources)
    }

    async fn list_due_sources(&self, now: DateTime<Utc>) -> Result<Vec<Source>> {
        let sql = format!(
            r#"
            SELECT {SOURCE_COLUMNS} FROM sources
            WHERE enabled
              AND (pause_until IS NULL OR pause_until <= $1)
              AND (last_checked_at IS NULL
                   OR last_checked_at <= $1 - make_interval(mins => interval_minutes))
            ORDER BY last_checked_at NULLS FIRST, id
            "#
        );
        let sources = sqlx::query_as::<_, Source>(&sql)
            .bind(now)
            .fetch_all(self.pool())
            .await?;
        Ok(sources)
    }

    async fn record_run(&self, run: &SourceRun) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO source_runs (id, source_id, status, http_status, found_count,
                                     accepted_count, skipped_duplicate, skipped_filtered,
                                     skipped_old, skipped_invalid, error, decisions, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(run.id)
        .bind(&run.source_id)
        .bind(run.status)
        .bind(run.http_status)
        .bind(run.found_count)
        .bind(run.accepted_count)
        .bind(run.skipped_duplicate)
        .bind(run.skipped_filtered)
        .bind(run.skipped_old)
        .bind(run.skipped_invalid)
        .bind(&run.error)
        .bind(&run.decisions)
        .bind(run.created_at)
        .execute(&mut *tx)
        .await?;

        let ok = run.status == RunStatus::Ok;
        sqlx::query(
            r#"
            UPDATE sources
            SET last_checked_at = $2,
                last_ok_at = CASE WHEN $3 THEN $2 ELSE last_ok_at END,
                last_error = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&run.source_id)
        .bind(run.created_at)
        .bind(ok)
        .bind(&run.error)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn recent_runs(&self, source_id: &str, limit: i64) -> Result<Vec<SourceRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM source_runs WHERE source_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let runs = sqlx::query_as::<_, SourceRun>(&sql)
            .bind(source_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(runs)
    }

    async fn pause_source(
        &self,
        source_id: &str,
        pause_until: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sources
            SET enabled = FALSE, pause_until = $2, paused_reason = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(source_id)
        .bind(pause_until)
        .bind(reason)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn insert_health_alert(&self, alert: &HealthAlert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO health_alerts (id, source_id, alert_type, message, streak, pause_until,
                                       created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(alert.id)
        .bind(&alert.source_id)
        .bind(&alert.alert_type)
        .bind(&alert.message)
        .bind(alert.streak)
        .bind(alert.pause_until)
        .bind(alert.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list_health_alerts(&self, limit: i64) -> Result<Vec<HealthAlert>> {
        let alerts = sqlx::query_as::<_, HealthAlert>(
            r#"
            SELECT id, source_id, alert_type, message, streak, pause_until, created_at
            FROM health_alerts
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(alerts)
    }
}
