//! PostgreSQL handle shared by every repository implementation.

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Versioned schema migrations, tracked in `_sqlx_migrations`.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// PostgreSQL-backed store.
///
/// Implements [`JobQueue`](crate::kernel::jobs::JobQueue),
/// [`SettingsStore`](crate::domains::settings::SettingsStore),
/// [`SourceStore`](crate::domains::sources::SourceStore),
/// [`ArticleStore`](crate::domains::articles::ArticleStore) and
/// [`CveStore`](crate::domains::cve::CveStore).
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small pool; each worker runs one job at a time.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }
}
