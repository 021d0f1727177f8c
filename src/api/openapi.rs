//! OpenAPI documentation and schema generation
//!
//! The document is generated at compile time with utoipa from the
//! `#[utoipa::path]` annotations on the route handlers.

use utoipa::OpenApi;

/// OpenAPI documentation for the scopus-harvester REST API
///
/// Served as JSON at `/api/v1/openapi.json` and rendered by Swagger UI at
/// `/swagger-ui` when enabled.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "scopus-harvester REST API",
        version = "0.1.0",
        description = "Upload ISSN spreadsheets, follow their Scopus exports and re-queue failed lookups",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6789/api/v1", description = "Local development server")
    ),
    paths(
        // Batches
        crate::api::routes::upload_batch,
        crate::api::routes::list_batches,
        crate::api::routes::get_batch,
        crate::api::routes::list_batch_identifiers,
        crate::api::routes::requeue_batches,
        crate::api::routes::requeue_batch,
        crate::api::routes::delete_batch,

        // Identifiers
        crate::api::routes::list_identifiers,
        crate::api::routes::get_identifier,

        // System
        crate::api::routes::get_capabilities,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::BatchId,
        crate::types::IdentifierId,
        crate::types::BatchStatus,
        crate::types::IdentifierStatus,
        crate::types::StatusCounts,
        crate::types::BatchInfo,
        crate::types::IdentifierInfo,
        crate::types::MessageLevel,
        crate::types::ReportMessage,
        crate::types::UploadReport,
        crate::types::RequeueReport,
        crate::types::Capabilities,
        crate::types::Event,

        crate::api::routes::RequeueRequest,
        crate::api::routes::RequeueBatchResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "batches", description = "Spreadsheet uploads and batch re-processing"),
        (name = "identifiers", description = "Per-ISSN export status and results"),
        (name = "system", description = "Health, capabilities, OpenAPI document, event stream"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `X-Api-Key` header scheme
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
