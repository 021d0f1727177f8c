//! Database layer for scopus-harvester
//!
//! Handles SQLite persistence for upload batches and their ISSN identifiers.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`batches`] - Batch CRUD and per-status tallies
//! - [`identifiers`] - Identifier CRUD, status transitions, re-queue resets
//! - [`state`] - Runtime state (shutdown tracking)

use crate::types::{
    BatchId, BatchInfo, BatchStatus, IdentifierId, IdentifierInfo, IdentifierStatus, StatusCounts,
};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod batches;
mod identifiers;
mod migrations;
mod state;

/// New batch to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewBatch {
    /// Name of the uploaded spreadsheet
    pub original_filename: Option<String>,
    /// Initial status
    pub status: BatchStatus,
    /// Initial notes
    pub notes: Option<String>,
}

/// Batch record from database
#[derive(Debug, Clone, FromRow)]
pub struct Batch {
    /// Unique database ID
    pub id: i64,
    /// Unix timestamp of the upload
    pub uploaded_at: i64,
    /// Name of the uploaded spreadsheet
    pub original_filename: Option<String>,
    /// Status name (see [`BatchStatus::as_str`])
    pub status: String,
    /// Operator-facing notes
    pub notes: Option<String>,
}

impl Batch {
    /// Typed batch id
    pub fn batch_id(&self) -> BatchId {
        BatchId(self.id)
    }

    /// Decoded status
    pub fn status(&self) -> BatchStatus {
        BatchStatus::from_db(&self.status)
    }

    /// Combine with its identifier tally into the API representation
    pub fn into_info(self, counts: StatusCounts) -> BatchInfo {
        BatchInfo {
            id: BatchId(self.id),
            uploaded_at: from_timestamp(self.uploaded_at),
            status: BatchStatus::from_db(&self.status),
            original_filename: self.original_filename,
            notes: self.notes,
            counts,
        }
    }
}

/// Identifier record from database
#[derive(Debug, Clone, FromRow)]
pub struct Identifier {
    /// Unique database ID
    pub id: i64,
    /// Owning batch
    pub batch_id: i64,
    /// Normalized 8-character ISSN
    pub code: String,
    /// Status name (see [`IdentifierStatus::as_str`])
    pub status: String,
    /// Token of the last dispatched unit of work
    pub task_id: Option<String>,
    /// Saved export path
    pub result_path: Option<String>,
    /// Exported data rows
    pub article_count: Option<i64>,
    /// Last failure message
    pub error_message: Option<String>,
    /// Unix timestamp of creation
    pub created_at: i64,
    /// Unix timestamp of the last write
    pub updated_at: i64,
    /// Unix timestamp when the last run started
    pub processing_started_at: Option<i64>,
    /// Unix timestamp when the last run reached a terminal status
    pub processing_finished_at: Option<i64>,
}

impl Identifier {
    /// Typed identifier id
    pub fn identifier_id(&self) -> IdentifierId {
        IdentifierId(self.id)
    }

    /// Typed owning batch id
    pub fn batch(&self) -> BatchId {
        BatchId(self.batch_id)
    }

    /// Decoded status
    pub fn status(&self) -> IdentifierStatus {
        IdentifierStatus::from_db(&self.status)
    }
}

impl From<Identifier> for IdentifierInfo {
    fn from(row: Identifier) -> Self {
        IdentifierInfo {
            id: IdentifierId(row.id),
            batch_id: BatchId(row.batch_id),
            status: IdentifierStatus::from_db(&row.status),
            code: row.code,
            task_id: row.task_id,
            result_path: row.result_path.map(PathBuf::from),
            article_count: row.article_count,
            error_message: row.error_message,
            created_at: from_timestamp(row.created_at),
            updated_at: from_timestamp(row.updated_at),
            processing_started_at: row.processing_started_at.map(from_timestamp),
            processing_finished_at: row.processing_finished_at.map(from_timestamp),
        }
    }
}

/// Fields written together with a status change
///
/// `None` leaves the stored column untouched, so a later status write never
/// erases a result recorded earlier.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// New status
    pub status: IdentifierStatus,
    /// Saved export path
    pub result_path: Option<String>,
    /// Exported data rows
    pub article_count: Option<i64>,
    /// Failure message
    pub error_message: Option<String>,
}

impl StatusUpdate {
    /// A bare status change
    pub fn status(status: IdentifierStatus) -> Self {
        Self {
            status,
            result_path: None,
            article_count: None,
            error_message: None,
        }
    }

    /// A status change with a failure message
    pub fn failed(status: IdentifierStatus, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::status(status)
        }
    }
}

/// Filters for listing identifiers
#[derive(Debug, Clone, Default)]
pub struct IdentifierFilter {
    /// Restrict to one batch
    pub batch_id: Option<BatchId>,
    /// Restrict to one status
    pub status: Option<IdentifierStatus>,
}

/// Database handle for scopus-harvester
pub struct Database {
    pool: SqlitePool,
}

fn from_timestamp(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

/// Render a fixed set of statuses as a SQL `IN (...)` list body
fn status_list(statuses: &[IdentifierStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
