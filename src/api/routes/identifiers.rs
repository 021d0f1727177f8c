//! Identifier handlers.

use super::IdentifierQuery;
use crate::api::AppState;
use crate::db::IdentifierFilter;
use crate::types::{BatchId, IdentifierId, IdentifierInfo};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /identifiers - List identifiers, optionally filtered
#[utoipa::path(
    get,
    path = "/api/v1/identifiers",
    tag = "identifiers",
    params(IdentifierQuery),
    responses(
        (status = 200, description = "Matching identifiers", body = Vec<crate::types::IdentifierInfo>),
        (status = 400, description = "Unknown status filter"),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn list_identifiers(
    State(state): State<AppState>,
    Query(query): Query<IdentifierQuery>,
) -> Response {
    let filter = IdentifierFilter {
        batch_id: query.batch_id.map(BatchId),
        status: query.status,
    };

    match state.harvester.db.list_identifiers(&filter).await {
        Ok(rows) => {
            let infos: Vec<IdentifierInfo> = rows.into_iter().map(IdentifierInfo::from).collect();
            (StatusCode::OK, Json(infos)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list identifiers");
            e.into_response()
        }
    }
}

/// GET /identifiers/:id - Get a single identifier
#[utoipa::path(
    get,
    path = "/api/v1/identifiers/{id}",
    tag = "identifiers",
    params(
        ("id" = i64, Path, description = "Identifier ID")
    ),
    responses(
        (status = 200, description = "Identifier", body = crate::types::IdentifierInfo),
        (status = 404, description = "Identifier not found", body = crate::error::ApiError)
    )
)]
pub async fn get_identifier(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.harvester.db.get_identifier(IdentifierId(id)).await {
        Ok(Some(row)) => (StatusCode::OK, Json(IdentifierInfo::from(row))).into_response(),
        Ok(None) => crate::Error::NotFound(format!("identifier {}", id)).into_response(),
        Err(e) => e.into_response(),
    }
}
