//! API key authentication
//!
//! When `api.api_key` is configured every request must carry the same value in
//! the `X-Api-Key` header, otherwise it is answered with 401.

use crate::error::ApiError;
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Middleware rejecting requests without the configured API key
///
/// ```no_run
/// use axum::{Router, middleware};
/// use scopus_harvester::api::auth::require_api_key;
///
/// let router: Router = Router::new().layer(middleware::from_fn_with_state(
///     Some("operator-key".to_string()),
///     require_api_key,
/// ));
/// ```
pub async fn require_api_key(
    State(expected): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => reject(request, "Invalid API key"),
        None => reject(request, "Missing X-Api-Key header"),
    }
}

fn reject(request: Request, message: &str) -> Response {
    tracing::debug!(path = %request.uri().path(), reason = message, "Rejected API request");
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}

/// Compares every byte so the time taken does not reveal the mismatch position
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    fn guarded(key: Option<&str>) -> Router {
        Router::new()
            .route("/batches", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                key.map(str::to_string),
                require_api_key,
            ))
    }

    async fn call(app: Router, key: Option<&str>) -> (StatusCode, String) {
        let mut request = axum::http::Request::builder().uri("/batches");
        if let Some(key) = key {
            request = request.header("x-api-key", key);
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_open_when_no_key_is_configured() {
        let (status, body) = call(guarded(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_matching_key_passes() {
        let (status, _) = call(guarded(Some("s3cret")), Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wrong_or_missing_key_is_unauthorized() {
        let (status, body) = call(guarded(Some("s3cret")), Some("S3CRET")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid API key"));
        assert!(body.contains("unauthorized"));

        let (status, body) = call(guarded(Some("s3cret")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Missing X-Api-Key header"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abc "));
    }
}
