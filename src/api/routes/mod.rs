//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`batches`] - Upload, listing, re-queue and deletion of batches
//! - [`identifiers`] - Read-only identifier listings
//! - [`system`] - Health, capabilities, events, OpenAPI

use serde::{Deserialize, Serialize};

use crate::types::{BatchId, IdentifierStatus};

mod batches;
mod identifiers;
mod system;

// Re-export all handlers so `routes::function_name` works
pub use batches::*;
pub use identifiers::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Query parameters for GET /identifiers
#[derive(Debug, Default, Deserialize, Serialize, utoipa::IntoParams)]
pub struct IdentifierQuery {
    /// Restrict to one status (e.g. "SCOPUS_EXPORT_ERROR")
    pub status: Option<IdentifierStatus>,
    /// Restrict to one batch
    pub batch_id: Option<i64>,
}

/// Request body for POST /batches/requeue
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct RequeueRequest {
    /// Batches to re-process
    pub batch_ids: Vec<BatchId>,
}

/// Response for POST /batches/{id}/requeue
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct RequeueBatchResponse {
    /// The re-queued batch
    pub batch_id: BatchId,
    /// Identifiers reset to pending
    pub identifiers_reset: usize,
}
