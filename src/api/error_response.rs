//! HTTP error responses
//!
//! Converts [`Error`] into a status code from [`ToHttpStatus`] and a JSON
//! [`ApiError`] body.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::warn!(error = %self, status = status_code.as_u16(), "Request failed");
        }

        let api_error: ApiError = self.into();
        (status_code, Json(api_error)).into_response()
    }
}

/// A bare `ApiError` carries no status of its own and is sent as a 500
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
