use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::models::{CveChange, CveRecord, CveSnapshot};
use crate::kernel::store::PostgresStore;

const CVE_COLUMNS: &str = "cve_id, published_at, last_modified_at, description, preferred_version, \
     preferred_score, preferred_severity, preferred_vector, cvss_v31, cvss_v40, vendors, products, \
     cpes, affected, reference_domains, first_seen_at, updated_at";

const SNAPSHOT_COLUMNS: &str =
    "id, cve_id, observed_at, last_modified_at, preferred, cvss_v31, cvss_v40, snapshot_hash";

const CHANGE_COLUMNS: &str = "id, cve_id, change_type, from_snapshot_id, to_snapshot_id, \
     from_score, to_score, from_severity, to_severity, from_vector, to_vector, reasons, evidence, \
     detected_at";

/// CVE current state, snapshots and changes.
#[async_trait]
pub trait CveStore: Send + Sync {
    /// Insert or replace the current-state row, keeping `first_seen_at`.
    async fn upsert_cve(&self, record: &CveRecord) -> Result<()>;

    async fn get_cve(&self, cve_id: &str) -> Result<Option<CveRecord>>;

    /// Most recently observed snapshot.
    async fn latest_snapshot(&self, cve_id: &str) -> Result<Option<CveSnapshot>>;

    /// Insert a snapshot together with the changes leading to it, atomically.
    ///
    /// Nothing is written when `(cve_id, snapshot_hash)` already exists, and
    /// `None` is returned; otherwise the number of change rows inserted.
    async fn record_snapshot(
        &self,
        snapshot: &CveSnapshot,
        changes: &[CveChange],
    ) -> Result<Option<usize>>;

    /// Oldest first.
    async fn list_snapshots(&self, cve_id: &str) -> Result<Vec<CveSnapshot>>;

    /// Newest first, optionally for one CVE.
    async fn list_changes(&self, cve_id: Option<&str>, limit: i64) -> Result<Vec<CveChange>>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

#[async_trait]
impl CveStore for PostgresStore {
    async fn upsert_cve(&self, record: &CveRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cves (cve_id, published_at, last_modified_at, description,
                              preferred_version, preferred_score, preferred_severity,
                              preferred_vector, cvss_v31, cvss_v40, vendors, products, cpes,
                              affected, reference_domains, first_seen_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (cve_id) DO UPDATE SET
                published_at = EXCLUDED.published_at,
                last_modified_at = EXCLUDED.last_modified_at,
                description = EXCLUDED.description,
                preferred_version = EXCLUDED.preferred_version,
                preferred_score = EXCLUDED.preferred_score,
                preferred_severity = EXCLUDED.preferred_severity,
                preferred_vector = EXCLUDED.preferred_vector,
                cvss_v31 = EXCLUDED.cvss_v31,
                cvss_v40 = EXCLUDED.cvss_v40,
                vendors = EXCLUDED.vendors,
                products = EXCLUDED.products,
                cpes = EXCLUDED.cpes,
                affected = EXCLUDED.affected,
                reference_domains = EXCLUDED.reference_domains,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.cve_id)
        .bind(record.published_at)
        .bind(record.last_modified_at)
        .bind(&record.description)
        .bind(&record.preferred_version)
        .bind(record.preferred_score)
        .bind(&record.preferred_severity)
        .bind(&record.preferred_vector)
        .bind(&record.cvss_v31)
        .bind(&record.cvss_v40)
        .bind(&record.vendors)
        .bind(&record.products)
        .bind(&record.cpes)
        .bind(&record.affected)
        .bind(&record.reference_domains)
        .bind(record.first_seen_at)
        .bind(record.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_cve(&self, cve_id: &str) -> Result<Option<CveRecord>> {
        let sql = format!("SELECT {CVE_COLUMNS} FROM cves WHERE cve_id = $1");
        let record = sqlx::query_as::<_, CveRecord>(&sql)
            .bind(cve_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(record)
    }

    async fn latest_snapshot(&self, cve_id: &str) -> Result<Option<CveSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM cve_snapshots WHERE cve_id = $1 \
             ORDER BY observed_at DESC, id DESC LIMIT 1"
        );
        let snapshot = sqlx::query_as::<_, CveSnapshot>(&sql)
            .bind(cve_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(snapshot)
    }

    async fn record_snapshot(
        &self,
        snapshot: &CveSnapshot,
        changes: &[CveChange],
    ) -> Result<Option<usize>> {
        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO cve_snapshots (id, cve_id, observed_at, last_modified_at, preferred,
                                       cvss_v31, cvss_v40, snapshot_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (cve_id, snapshot_hash) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(snapshot.id)
        .bind(&snapshot.cve_id)
        .bind(snapshot.observed_at)
        .bind(snapshot.last_modified_at)
        .bind(&snapshot.preferred)
        .bind(&snapshot.cvss_v31)
        .bind(&snapshot.cvss_v40)
        .bind(&snapshot.snapshot_hash)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        for change in changes {
            sqlx::query(
                r#"
                INSERT INTO cve_changes (id, cve_id, change_type, from_snapshot_id,
                                         to_snapshot_id, from_score, to_score, from_severity,
                                         to_severity, from_vector, to_vector, reasons, evidence,
                                         detected_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(change.id)
            .bind(&change.cve_id)
            .bind(change.change_type)
            .bind(change.from_snapshot_id)
            .bind(change.to_snapshot_id)
            .bind(change.from_score)
            .bind(change.to_score)
            .bind(&change.from_severity)
            .bind(&change.to_severity)
            .bind(&change.from_vector)
            .bind(&change.to_vector)
            .bind(&change.reasons)
            .bind(&change.evidence)
            .bind(change.detected_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(changes.len()))
    }

    async fn list_snapshots(&self, cve_id: &str) -> Result<Vec<CveSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM cve_snapshots WHERE cve_id = $1 \
             ORDER BY observed_at, id"
        );
        let snapshots = sqlx::query_as::<_, CveSnapshot>(&sql)
            .bind(cve_id)
            .fetch_all(self.pool())
            .await?;
        Ok(snapshots)
    }

    async fn list_changes(&self, cve_id: Option<&str>, limit: i64) -> Result<Vec<CveChange>> {
        let sql = format!(
            r#"
            SELECT {CHANGE_COLUMNS} FROM cve_changes
            WHERE ($1::text IS NULL OR cve_id = $1)
            ORDER BY detected_at DESC, id DESC
            LIMIT $2
            "#
        );
        let changes = sqlx::query_as::<_, CveChange>(&sql)
            .bind(cve_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        Ok(changes)
    }
}
