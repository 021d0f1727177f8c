//! Runtime state tracking: shutdown detection.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Check if the last shutdown was unclean
    ///
    /// Returns true if the previous session did not call set_clean_shutdown(),
    /// indicating a crash or forced termination. A fresh database reports true
    /// as well, which only costs an empty recovery pass.
    pub async fn was_unclean_shutdown(&self) -> Result<bool> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = 'clean_shutdown'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to check shutdown state: {}",
                        e
                    )))
                })?;

        Ok(value.is_none_or(|v| v != "true"))
    }

    /// Mark that the service has started
    pub async fn set_clean_start(&self) -> Result<()> {
        self.set_shutdown_flag("false").await
    }

    /// Mark that the service is shutting down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.set_shutdown_flag("true").await
    }

    async fn set_shutdown_flag(&self, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES ('clean_shutdown', ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record shutdown state: {}",
                e
            )))
        })?;

        Ok(())
    }
}
