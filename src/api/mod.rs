//! REST API server module
//!
//! Exposes batch uploads, status queries, re-queueing and a live event
//! stream over HTTP, documented with an OpenAPI 3 specification.

use crate::{Config, Harvester, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Batches
/// - `POST /batches` - Upload an ISSN spreadsheet (multipart field `file`)
/// - `GET /batches` - List batches with identifier counts
/// - `GET /batches/:id` - Get single batch
/// - `DELETE /batches/:id` - Delete a batch and its identifiers
/// - `GET /batches/:id/identifiers` - Identifiers of a batch
/// - `POST /batches/:id/requeue` - Re-process one batch
/// - `POST /batches/requeue` - Re-process several batches
///
/// ## Identifiers
/// - `GET /identifiers` - List identifiers (`status`, `batch_id` filters)
/// - `GET /identifiers/:id` - Get single identifier
///
/// ## System
/// - `GET /capabilities` - VPN gate and browser driver in use
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(harvester: Arc<Harvester>, config: Arc<Config>) -> Router {
    let state = AppState::new(harvester, config.clone());

    let router = Router::new()
        // Batches
        .route(
            "/batches",
            get(routes::list_batches).post(routes::upload_batch),
        )
        .route("/batches/requeue", post(routes::requeue_batches))
        .route(
            "/batches/:id",
            get(routes::get_batch).delete(routes::delete_batch),
        )
        .route(
            "/batches/:id/identifiers",
            get(routes::list_batch_identifiers),
        )
        .route("/batches/:id/requeue", post(routes::requeue_batch))
        // Identifiers
        .route("/identifiers", get(routes::list_identifiers))
        .route("/identifiers/:id", get(routes::get_identifier))
        // System
        .route("/capabilities", get(routes::get_capabilities))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // SwaggerUi points at the /openapi.json route above
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    let router = router.layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer for the configured origins
///
/// `"*"` or an empty list allows any origin. Unparseable origins are ignored.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Serve the API on `config.api.bind_address` until the server stops
///
/// # Example
///
/// ```no_run
/// use scopus_harvester::{Config, Harvester};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let harvester = Arc::new(Harvester::new((*config).clone()).await?);
/// harvester.start_dispatcher();
///
/// scopus_harvester::api::start_api_server(harvester, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(harvester: Arc<Harvester>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(harvester, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
