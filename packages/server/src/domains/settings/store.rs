use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::kernel::store::PostgresStore;

/// Key/value settings persistence.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Insert or replace the value for `key`.
    async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

/// Typed access over any [`SettingsStore`].
#[async_trait]
pub trait SettingsStoreExt {
    /// Read `key` as `T`, or `default` when the key is unset.
    ///
    /// A stored value that does not decode as `T` is an error.
    async fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static;

    async fn set_typed<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync;
}

#[async_trait]
impl<S: SettingsStore + ?Sized> SettingsStoreExt for S {
    async fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match self.get_setting(key).await? {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("setting {key} has an unexpected shape")),
        }
    }

    async fn set_typed<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)
            .with_context(|| format!("failed to serialize setting {key}"))?;
        self.set_setting(key, value).await
    }
}

#[async_trait]
impl SettingsStore for PostgresStore {
    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let value = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT value FROM settings WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await?;
        Ok(value)
    }

    async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
