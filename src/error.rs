//! Error types for scopus-harvester
//!
//! This module provides the error handling for the library, including:
//! - Domain-specific error types (Batch, Upload, Browser, Config, etc.)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for scopus-harvester operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scopus-harvester
///
/// Workflow failures never surface through this type: they are classified into an
/// identifier status by the workflow runner. `Error` covers the service around it
/// (storage, uploads, configuration, the WebDriver transport, the API server).
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "portal.operator_email")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Batch-related error
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// Spreadsheet upload error
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Browser automation error
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new batches
    #[error("shutdown in progress: not accepting new batches")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// External tool execution failed (pon, rasdial, ip, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, unsupported platform, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate code within a batch)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Batch-related errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// Batch not found in the database
    #[error("batch {id} not found")]
    NotFound {
        /// The batch ID that was not found
        id: i64,
    },

    /// Batch status does not allow re-processing
    #[error("batch {id} cannot be re-processed in status {status}")]
    NotRequeueable {
        /// The batch ID
        id: i64,
        /// The batch's current status
        status: String,
    },

    /// Batch has no identifiers eligible for re-processing
    #[error("batch {id} has no re-processable ISSN queries")]
    NothingToRequeue {
        /// The batch ID
        id: i64,
    },

    /// Batch is being worked on and cannot be removed
    #[error("batch {id} is still processing")]
    Busy {
        /// The batch ID
        id: i64,
    },
}

/// Spreadsheet upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// No file was supplied with the upload
    #[error("no file supplied")]
    MissingFile,

    /// The spreadsheet has no column whose header mentions ISSN
    #[error("missing 'ISSN' column in {filename}")]
    MissingIdentifierColumn {
        /// Name of the uploaded file
        filename: String,
    },

    /// The spreadsheet could not be parsed
    #[error("could not read {filename}: {reason}")]
    Unreadable {
        /// Name of the uploaded file
        filename: String,
        /// Parser error description
        reason: String,
    },
}

/// Browser automation (WebDriver) errors
#[derive(Debug, Error)]
pub enum BrowserError {
    /// A new browser session could not be created
    #[error("failed to start browser session: {0}")]
    SessionStart(String),

    /// The driver answered a command with a protocol error
    #[error("webdriver command {command} failed: {message}")]
    Command {
        /// The command that failed (e.g., "navigate", "element/click")
        command: String,
        /// The driver's error string and message
        message: String,
    },

    /// No element matched the selector before the deadline
    #[error("no element matching {selector}")]
    ElementNotFound {
        /// The CSS selector or XPath expression
        selector: String,
    },

    /// A wait exceeded its deadline
    #[error("timed out after {seconds}s waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: String,
        /// The deadline in seconds
        seconds: u64,
    },

    /// The export download never appeared or could not be moved into place
    #[error("download failed: {0}")]
    Download(String),
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "batch_not_found",
///     "message": "batch error: batch 12 not found",
///     "details": {
///       "batch_id": 12
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Config { .. } => 400,
            Error::Upload(UploadError::MissingFile) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Batch(BatchError::NotFound { .. }) => 404,
            Error::Database(DatabaseError::NotFound(_)) => 404,

            // 409 Conflict
            Error::Batch(BatchError::NotRequeueable { .. }) => 409,
            Error::Batch(BatchError::NothingToRequeue { .. }) => 409,
            Error::Batch(BatchError::Busy { .. }) => 409,
            Error::Database(DatabaseError::ConstraintViolation(_)) => 409,

            // 422 Unprocessable Entity
            Error::Upload(_) => 422,

            // 500 Internal Server Error
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - external service errors
            Error::Browser(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,

            // 501 Not Implemented
            Error::NotSupported(_) => 501,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Batch(e) => match e {
                BatchError::NotFound { .. } => "batch_not_found",
                BatchError::NotRequeueable { .. } => "not_requeueable",
                BatchError::NothingToRequeue { .. } => "nothing_to_requeue",
                BatchError::Busy { .. } => "batch_busy",
            },
            Error::Upload(e) => match e {
                UploadError::MissingFile => "missing_file",
                UploadError::MissingIdentifierColumn { .. } => "missing_issn_column",
                UploadError::Unreadable { .. } => "unreadable_spreadsheet",
            },
            Error::Browser(_) => "browser_error",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Batch(BatchError::NotFound { id })
            | Error::Batch(BatchError::NothingToRequeue { id })
            | Error::Batch(BatchError::Busy { id }) => Some(serde_json::json!({
                "batch_id": id,
            })),
            Error::Batch(BatchError::NotRequeueable { id, status }) => Some(serde_json::json!({
                "batch_id": id,
                "status": status,
            })),
            Error::Upload(UploadError::MissingIdentifierColumn { filename })
            | Error::Upload(UploadError::Unreadable { filename, .. }) => {
                Some(serde_json::json!({
                    "filename": filename,
                }))
            }
            Error::Config {
                key: Some(key), ..
            } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
