//! Batch handlers: spreadsheet upload, listing, re-queue, deletion.

use super::{RequeueBatchResponse, RequeueRequest};
use crate::api::AppState;
use crate::error::{Error, UploadError};
use crate::types::{BatchId, BatchStatus, IdentifierInfo};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST /batches - Upload an ISSN spreadsheet
#[utoipa::path(
    post,
    path = "/api/v1/batches",
    tag = "batches",
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "Spreadsheet (.csv, .xlsx, .xls) in field `file`"),
    responses(
        (status = 201, description = "Batch created and queued", body = crate::types::UploadReport),
        (status = 400, description = "No file supplied", body = crate::error::ApiError),
        (status = 422, description = "Nothing valid to process", body = crate::types::UploadReport),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn upload_batch(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut upload: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": {
                            "code": "invalid_multipart",
                            "message": format!("Failed to read multipart data: {}", e)
                        }
                    })),
                )
                    .into_response();
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        match field.bytes().await {
            Ok(bytes) => upload = Some((filename, bytes.to_vec())),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": {
                            "code": "invalid_file",
                            "message": format!("Failed to read file: {}", e)
                        }
                    })),
                )
                    .into_response();
            }
        }
    }

    let Some((filename, bytes)) = upload else {
        return Error::Upload(UploadError::MissingFile).into_response();
    };

    match state.harvester.upload_bytes(&filename, &bytes).await {
        Ok(report) if report.status == BatchStatus::Failed => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(report)).into_response()
        }
        Ok(report) => (StatusCode::CREATED, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /batches - List batches with identifier counts
#[utoipa::path(
    get,
    path = "/api/v1/batches",
    tag = "batches",
    responses(
        (status = 200, description = "All batches, newest first", body = Vec<crate::types::BatchInfo>),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn list_batches(State(state): State<AppState>) -> Response {
    match state.harvester.list_batches().await {
        Ok(batches) => (StatusCode::OK, Json(batches)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list batches");
            e.into_response()
        }
    }
}

/// GET /batches/:id - Get a single batch
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}",
    tag = "batches",
    params(
        ("id" = i64, Path, description = "Batch ID")
    ),
    responses(
        (status = 200, description = "Batch with identifier counts", body = crate::types::BatchInfo),
        (status = 404, description = "Batch not found", body = crate::error::ApiError)
    )
)]
pub async fn get_batch(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.harvester.batch_info(BatchId(id)).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /batches/:id/identifiers - Identifiers of one batch
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}/identifiers",
    tag = "batches",
    params(
        ("id" = i64, Path, description = "Batch ID")
    ),
    responses(
        (status = 200, description = "Identifiers in upload order", body = Vec<crate::types::IdentifierInfo>),
        (status = 404, description = "Batch not found", body = crate::error::ApiError)
    )
)]
pub async fn list_batch_identifiers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    let batch_id = BatchId(id);
    if let Err(e) = state.harvester.batch_info(batch_id).await {
        return e.into_response();
    }

    let filter = crate::db::IdentifierFilter {
        batch_id: Some(batch_id),
        status: None,
    };
    match state.harvester.db.list_identifiers(&filter).await {
        Ok(rows) => {
            let infos: Vec<IdentifierInfo> = rows.into_iter().map(IdentifierInfo::from).collect();
            (StatusCode::OK, Json(infos)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// POST /batches/requeue - Re-process failed identifiers of several batches
#[utoipa::path(
    post,
    path = "/api/v1/batches/requeue",
    tag = "batches",
    request_body = RequeueRequest,
    responses(
        (status = 200, description = "Per-batch outcome", body = crate::types::RequeueReport),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn requeue_batches(
    State(state): State<AppState>,
    Json(request): Json<RequeueRequest>,
) -> Response {
    match state.harvester.requeue(&request.batch_ids).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /batches/:id/requeue - Re-process failed identifiers of one batch
#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/requeue",
    tag = "batches",
    params(
        ("id" = i64, Path, description = "Batch ID")
    ),
    responses(
        (status = 200, description = "Batch re-queued", body = RequeueBatchResponse),
        (status = 404, description = "Batch not found", body = crate::error::ApiError),
        (status = 409, description = "Batch not eligible or nothing to re-process", body = crate::error::ApiError)
    )
)]
pub async fn requeue_batch(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let batch_id = BatchId(id);
    match state.harvester.requeue_batch(batch_id).await {
        Ok(identifiers_reset) => (
            StatusCode::OK,
            Json(RequeueBatchResponse {
                batch_id,
                identifiers_reset,
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /batches/:id - Delete a batch and its identifiers
#[utoipa::path(
    delete,
    path = "/api/v1/batches/{id}",
    tag = "batches",
    params(
        ("id" = i64, Path, description = "Batch ID")
    ),
    responses(
        (status = 204, description = "Batch deleted"),
        (status = 404, description = "Batch not found", body = crate::error::ApiError),
        (status = 409, description = "Batch still processing", body = crate::error::ApiError)
    )
)]
pub async fn delete_batch(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.harvester.delete_batch(BatchId(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
