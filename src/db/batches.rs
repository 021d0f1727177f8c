//! Batch CRUD and per-status identifier tallies.

use crate::error::DatabaseError;
use crate::types::{BatchId, BatchStatus, IdentifierStatus, StatusCounts};
use crate::{Error, Result};

use super::{Batch, Database, NewBatch};

impl Database {
    /// Insert a new batch
    pub async fn insert_batch(&self, batch: &NewBatch) -> Result<BatchId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO batches (uploaded_at, original_filename, status, notes)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(now)
        .bind(&batch.original_filename)
        .bind(batch.status.as_str())
        .bind(&batch.notes)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert batch: {}",
                e
            )))
        })?;

        Ok(BatchId(result.last_insert_rowid()))
    }

    /// Get a batch by ID
    pub async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>> {
        let row = sqlx::query_as::<_, Batch>(
            r#"
            SELECT id, uploaded_at, original_filename, status, notes
            FROM batches
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get batch: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all batches, newest first
    pub async fn list_batches(&self) -> Result<Vec<Batch>> {
        let rows = sqlx::query_as::<_, Batch>(
            r#"
            SELECT id, uploaded_at, original_filename, status, notes
            FROM batches
            ORDER BY uploaded_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list batches: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Set a batch's status, replacing its notes when `notes` is given
    pub async fn update_batch_status(
        &self,
        id: BatchId,
        status: BatchStatus,
        notes: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE batches
            SET status = ?, notes = COALESCE(?, notes)
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update batch status: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "batch {}",
                id
            ))));
        }

        Ok(())
    }

    /// Delete a batch and, through the cascade, its identifiers
    ///
    /// Returns false when the batch did not exist.
    pub async fn delete_batch(&self, id: BatchId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM batches WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete batch: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Tally a batch's identifiers by status
    pub async fn batch_status_counts(&self, id: BatchId) -> Result<StatusCounts> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*)
            FROM identifiers
            WHERE batch_id = ?
            GROUP BY status
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count identifiers: {}",
                e
            )))
        })?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.add(IdentifierStatus::from_db(&status), count);
        }
        Ok(counts)
    }
}
