//! Identifier CRUD, status transitions and re-queue resets.

use std::collections::HashSet;

use crate::error::DatabaseError;
use crate::types::{BatchId, IdentifierId, IdentifierStatus};
use crate::{Error, Result};

use super::{Database, Identifier, IdentifierFilter, StatusUpdate, status_list};

const IDENTIFIER_COLUMNS: &str = r#"
    id, batch_id, code, status, task_id, result_path, article_count, error_message,
    created_at, updated_at, processing_started_at, processing_finished_at
"#;

impl Database {
    /// Insert a pending identifier into a batch
    ///
    /// A second insert of the same code into the same batch fails with
    /// [`DatabaseError::ConstraintViolation`].
    pub async fn insert_identifier(&self, batch_id: BatchId, code: &str) -> Result<IdentifierId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO identifiers (batch_id, code, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch_id)
        .bind(code)
        .bind(IdentifierStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "identifier {} already exists in batch {}",
                    code, batch_id
                )))
            }
            _ => Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert identifier: {}",
                e
            ))),
        })?;

        Ok(IdentifierId(result.last_insert_rowid()))
    }

    /// Codes already present in a batch
    pub async fn batch_codes(&self, batch_id: BatchId) -> Result<HashSet<String>> {
        let codes: Vec<String> = sqlx::query_scalar("SELECT code FROM identifiers WHERE batch_id = ?")
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list batch codes: {}",
                    e
                )))
            })?;

        Ok(codes.into_iter().collect())
    }

    /// Get an identifier by ID
    pub async fn get_identifier(&self, id: IdentifierId) -> Result<Option<Identifier>> {
        let row = sqlx::query_as::<_, Identifier>(&format!(
            "SELECT {} FROM identifiers WHERE id = ?",
            IDENTIFIER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get identifier: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List identifiers, optionally filtered by batch and status, in creation order
    pub async fn list_identifiers(&self, filter: &IdentifierFilter) -> Result<Vec<Identifier>> {
        let rows = sqlx::query_as::<_, Identifier>(&format!(
            r#"
            SELECT {}
            FROM identifiers
            WHERE (?1 IS NULL OR batch_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY id ASC
            "#,
            IDENTIFIER_COLUMNS
        ))
        .bind(filter.batch_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list identifiers: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// IDs of a batch's pending identifiers, in creation order
    pub async fn pending_identifier_ids(&self, batch_id: BatchId) -> Result<Vec<IdentifierId>> {
        let ids: Vec<IdentifierId> = sqlx::query_scalar(
            "SELECT id FROM identifiers WHERE batch_id = ? AND status = ? ORDER BY id ASC",
        )
        .bind(batch_id)
        .bind(IdentifierStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list pending identifiers: {}",
                e
            )))
        })?;

        Ok(ids)
    }

    /// Apply a status change together with its result fields
    ///
    /// Entering `PROCESSING` stamps `processing_started_at`. Entering any
    /// terminal status stamps `processing_finished_at`; entering `PENDING` or
    /// `PROCESSING` clears it, so the column is set exactly when the status is
    /// terminal.
    pub async fn update_identifier_status(
        &self,
        id: IdentifierId,
        update: &StatusUpdate,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let started_at = (update.status == IdentifierStatus::Processing).then_some(now);
        let finished_at = update.status.is_terminal().then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE identifiers
            SET status = ?,
                result_path = COALESCE(?, result_path),
                article_count = COALESCE(?, article_count),
                error_message = COALESCE(?, error_message),
                processing_started_at = COALESCE(?, processing_started_at),
                processing_finished_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.result_path)
        .bind(update.article_count)
        .bind(&update.error_message)
        .bind(started_at)
        .bind(finished_at)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update identifier status: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "identifier {}",
                id
            ))));
        }

        tracing::debug!(
            identifier_id = id.0,
            status = update.status.as_str(),
            "identifier status updated"
        );

        Ok(())
    }

    /// Record the token of the unit of work now handling an identifier
    pub async fn set_task_id(&self, id: IdentifierId, task_id: &str) -> Result<()> {
        sqlx::query("UPDATE identifiers SET task_id = ?, updated_at = ? WHERE id = ?")
            .bind(task_id)
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set task id: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Reset a batch's re-processable identifiers to `PENDING`
    ///
    /// Clears the task token, error message and both processing timestamps.
    /// `COMPLETED` and `NO_RESULTS` rows are never touched. Returns the number
    /// of identifiers reset.
    pub async fn reset_for_requeue(&self, batch_id: BatchId) -> Result<u64> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE identifiers
            SET status = ?,
                task_id = NULL,
                error_message = NULL,
                processing_started_at = NULL,
                processing_finished_at = NULL,
                updated_at = ?
            WHERE batch_id = ? AND status IN ({})
            "#,
            status_list(&IdentifierStatus::REQUEUEABLE)
        ))
        .bind(IdentifierStatus::Pending.as_str())
        .bind(chrono::Utc::now().timestamp())
        .bind(batch_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset identifiers: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }

    /// Return identifiers stranded in `PROCESSING` to `PENDING`
    ///
    /// Used at startup after an unclean stop. Returns the affected batches.
    pub async fn recover_interrupted(&self) -> Result<Vec<BatchId>> {
        let batches: Vec<BatchId> = sqlx::query_scalar(
            "SELECT DISTINCT batch_id FROM identifiers WHERE status = ? ORDER BY batch_id ASC",
        )
        .bind(IdentifierStatus::Processing.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find interrupted identifiers: {}",
                e
            )))
        })?;

        if batches.is_empty() {
            return Ok(batches);
        }

        sqlx::query(
            r#"
            UPDATE identifiers
            SET status = ?, task_id = NULL, processing_started_at = NULL,
                processing_finished_at = NULL, updated_at = ?
            WHERE status = ?
            "#,
        )
        .bind(IdentifierStatus::Pending.as_str())
        .bind(chrono::Utc::now().timestamp())
        .bind(IdentifierStatus::Processing.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset interrupted identifiers: {}",
                e
            )))
        })?;

        Ok(batches)
    }
}
