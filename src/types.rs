//! Core types for scopus-harvester

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Declares an integer-backed record identifier with the conversions and
/// sqlx impls needed to bind it directly in queries.
macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Wrap a raw row id
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl PartialEq<i64> for $name {
            fn eq(&self, other: &i64) -> bool {
                self.0 == *other
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

record_id!(
    /// Unique identifier for an upload batch
    BatchId
);

record_id!(
    /// Unique identifier for a single ISSN lookup
    IdentifierId
);

/// Batch status
///
/// Stored as its upper-case name in the `batches.status` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Created, not yet dispatched
    Pending,
    /// Identifiers are being worked through
    Processing,
    /// Drained with a mix of successes and failures
    PartialComplete,
    /// Every identifier completed or had no results
    Completed,
    /// Nothing could be processed
    Failed,
}

impl BatchStatus {
    /// Every batch status, in declaration order
    pub const ALL: [BatchStatus; 5] = [
        BatchStatus::Pending,
        BatchStatus::Processing,
        BatchStatus::PartialComplete,
        BatchStatus::Completed,
        BatchStatus::Failed,
    ];

    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "PENDING",
            BatchStatus::Processing => "PROCESSING",
            BatchStatus::PartialComplete => "PARTIAL_COMPLETE",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
        }
    }

    /// Decode a stored status, treating unknown values as `Failed` so corrupt rows surface
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(BatchStatus::Failed)
    }

    /// Whether an operator may re-queue a batch in this status
    pub fn is_requeueable(&self) -> bool {
        matches!(
            self,
            BatchStatus::Pending | BatchStatus::Failed | BatchStatus::PartialComplete
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown batch status: {s}"))
    }
}

/// Status of a single ISSN lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierStatus {
    /// Waiting for the dispatcher
    Pending,
    /// A unit of work is running for this identifier
    Processing,
    /// The VPN gate could not be acquired
    VpnError,
    /// The intermediary portal could not be navigated
    GigalibError,
    /// The database site could not be entered from the portal
    ScopusLoginError,
    /// The advanced search could not be submitted
    ScopusSearchError,
    /// The export dialog could not be configured or the file not saved
    ScopusExportError,
    /// The search matched no documents
    NoResults,
    /// The export was saved and counted
    Completed,
    /// Unclassified failure or timeout
    Failed,
}

impl IdentifierStatus {
    /// Every identifier status, in declaration order
    pub const ALL: [IdentifierStatus; 10] = [
        IdentifierStatus::Pending,
        IdentifierStatus::Processing,
        IdentifierStatus::VpnError,
        IdentifierStatus::GigalibError,
        IdentifierStatus::ScopusLoginError,
        IdentifierStatus::ScopusSearchError,
        IdentifierStatus::ScopusExportError,
        IdentifierStatus::NoResults,
        IdentifierStatus::Completed,
        IdentifierStatus::Failed,
    ];

    /// Statuses an operator re-queue resets back to `Pending`
    pub const REQUEUEABLE: [IdentifierStatus; 7] = [
        IdentifierStatus::Pending,
        IdentifierStatus::Failed,
        IdentifierStatus::VpnError,
        IdentifierStatus::GigalibError,
        IdentifierStatus::ScopusLoginError,
        IdentifierStatus::ScopusSearchError,
        IdentifierStatus::ScopusExportError,
    ];

    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierStatus::Pending => "PENDING",
            IdentifierStatus::Processing => "PROCESSING",
            IdentifierStatus::VpnError => "VPN_ERROR",
            IdentifierStatus::GigalibError => "GIGALIB_ERROR",
            IdentifierStatus::ScopusLoginError => "SCOPUS_LOGIN_ERROR",
            IdentifierStatus::ScopusSearchError => "SCOPUS_SEARCH_ERROR",
            IdentifierStatus::ScopusExportError => "SCOPUS_EXPORT_ERROR",
            IdentifierStatus::NoResults => "NO_RESULTS",
            IdentifierStatus::Completed => "COMPLETED",
            IdentifierStatus::Failed => "FAILED",
        }
    }

    /// Decode a stored status, treating unknown values as `Failed`
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(IdentifierStatus::Failed)
    }

    /// Anything other than `Pending` or `Processing`
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            IdentifierStatus::Pending | IdentifierStatus::Processing
        )
    }

    /// `Completed` and `NoResults` are successful outcomes
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            IdentifierStatus::Completed | IdentifierStatus::NoResults
        )
    }

    /// Whether an operator re-queue resets this identifier
    pub fn is_requeueable(&self) -> bool {
        Self::REQUEUEABLE.contains(self)
    }
}

impl std::fmt::Display for IdentifierStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IdentifierStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IdentifierStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown identifier status: {s}"))
    }
}

/// Event emitted during the batch and identifier lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A spreadsheet was ingested into a new batch
    BatchCreated {
        /// Batch ID
        id: BatchId,
        /// Uploaded file name
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        /// Number of identifiers created
        identifiers: usize,
    },

    /// A batch changed status
    BatchStatusChanged {
        /// Batch ID
        id: BatchId,
        /// New status
        status: BatchStatus,
    },

    /// An operator re-queued a batch
    BatchRequeued {
        /// Batch ID
        id: BatchId,
        /// Number of identifiers reset to pending
        identifiers: usize,
    },

    /// A unit of work started for an identifier
    IdentifierStarted {
        /// Identifier ID
        id: IdentifierId,
        /// Owning batch
        batch_id: BatchId,
        /// ISSN code
        code: String,
    },

    /// A unit of work finished with a terminal status
    IdentifierFinished {
        /// Identifier ID
        id: IdentifierId,
        /// Owning batch
        batch_id: BatchId,
        /// ISSN code
        code: String,
        /// Terminal status
        status: IdentifierStatus,
        /// Exported rows, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        article_count: Option<i64>,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Per-status identifier tally for one batch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusCounts {
    /// Total identifiers in the batch
    pub total: i64,
    /// Waiting to run
    pub pending: i64,
    /// Currently running
    pub processing: i64,
    /// Exported successfully
    pub completed: i64,
    /// Search matched nothing
    pub no_results: i64,
    /// Any error status, including `FAILED`
    pub failed: i64,
}

impl StatusCounts {
    /// Add `count` identifiers in `status` to the tally
    pub fn add(&mut self, status: IdentifierStatus, count: i64) {
        self.total += count;
        match status {
            IdentifierStatus::Pending => self.pending += count,
            IdentifierStatus::Processing => self.processing += count,
            IdentifierStatus::Completed => self.completed += count,
            IdentifierStatus::NoResults => self.no_results += count,
            _ => self.failed += count,
        }
    }

    /// No identifier is waiting or running
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

/// Batch as returned by the API
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchInfo {
    /// Unique batch identifier
    pub id: BatchId,
    /// When the spreadsheet was uploaded
    pub uploaded_at: DateTime<Utc>,
    /// Uploaded file name
    pub original_filename: Option<String>,
    /// Current status
    pub status: BatchStatus,
    /// Operator-facing notes
    pub notes: Option<String>,
    /// Identifier tally
    pub counts: StatusCounts,
}

/// Identifier as returned by the API
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct IdentifierInfo {
    /// Unique identifier
    pub id: IdentifierId,
    /// Owning batch
    pub batch_id: BatchId,
    /// Normalized ISSN
    pub code: String,
    /// Current status
    pub status: IdentifierStatus,
    /// Token of the last dispatched unit of work
    pub task_id: Option<String>,
    /// Where the export CSV was saved
    #[schema(value_type = Option<String>)]
    pub result_path: Option<PathBuf>,
    /// Exported data rows
    pub article_count: Option<i64>,
    /// Last failure message
    pub error_message: Option<String>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
    /// When the last run started
    pub processing_started_at: Option<DateTime<Utc>>,
    /// When the last run reached a terminal status
    pub processing_finished_at: Option<DateTime<Utc>>,
}

/// Severity of an operator-facing message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    /// Informational success
    Success,
    /// Something was skipped
    Warning,
    /// The action did not happen
    Error,
}

/// Operator-facing message attached to upload and requeue reports
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReportMessage {
    /// Severity
    pub level: MessageLevel,
    /// Text shown to the operator
    pub text: String,
}

impl ReportMessage {
    /// Success message
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            text: text.into(),
        }
    }

    /// Warning message
    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            text: text.into(),
        }
    }

    /// Error message
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }
}

/// Outcome of ingesting one uploaded spreadsheet
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadReport {
    /// The batch created for the upload
    pub batch_id: BatchId,
    /// Batch status after ingestion (`PROCESSING` or `FAILED`)
    pub status: BatchStatus,
    /// Codes of the identifiers created
    pub created: Vec<String>,
    /// Raw values rejected as malformed
    pub invalid: Vec<String>,
    /// Normalized codes skipped because the batch already had them
    pub duplicates: Vec<String>,
    /// Operator-facing messages
    pub messages: Vec<ReportMessage>,
}

/// Outcome of a re-queue request across one or more batches
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct RequeueReport {
    /// Batches that were re-dispatched
    pub requeued: Vec<BatchId>,
    /// Total identifiers reset to pending
    pub identifiers_reset: usize,
    /// Batches left untouched
    pub skipped: Vec<BatchId>,
    /// Operator-facing messages
    pub messages: Vec<ReportMessage>,
}

/// Overall system capabilities
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// Name of the VPN gate implementation in use
    pub vpn_gate: String,
    /// Whether the gate actually dials a connection
    pub vpn_dials: bool,
    /// Name of the browser session factory in use
    pub browser: String,
}
