use async_trait::async_trait;

use crate::application::repos::{RepoError, SettingsRepo};

use super::{SqliteRepositories, map_sqlx_error};

#[async_trait]
impl SettingsRepo for SqliteRepositories {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, RepoError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
