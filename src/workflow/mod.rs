//! Export workflow
//!
//! One identifier's trip through the portal and into the database site,
//! modelled as an ordered sequence of [`ExportStep`]s. Each step has a
//! classified failure status; the browser itself sits behind the
//! [`ExportSession`] trait so the sequence can be driven by a real WebDriver
//! session or by a scripted double in tests.
//!
//! The workflow never returns an error: every failure ends up in the
//! [`WorkflowOutcome`], and the session is closed on every path.

mod export_limit;
mod files;
mod query;

pub use export_limit::{ExportLimitHints, resolve_export_limit};
pub use files::{count_data_rows, export_path};
pub use query::build_search_query;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, ExportConfig, SearchConfig, StepTimeouts};
use crate::db::StatusUpdate;
use crate::error::BrowserError;
use crate::types::{BatchId, IdentifierId, IdentifierStatus};

/// Longest failure message recorded on an identifier, in characters
pub const MAX_ERROR_MESSAGE_CHARS: usize = 250;

/// Steps of the export workflow, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStep {
    /// Reach the portal's email gate
    ReachPortal,
    /// Submit the operator email and reach the portal search page
    SubmitEmail,
    /// Follow the database link into the target site
    OpenDatabase,
    /// Submit the advanced search
    Search,
    /// Check whether the search matched anything
    CheckResults,
    /// Open and fill in the export dialog
    ConfigureExport,
    /// Save the export and count its rows
    Download,
    /// Record the result
    Complete,
}

impl ExportStep {
    /// All steps in execution order
    pub const ORDER: [ExportStep; 8] = [
        ExportStep::ReachPortal,
        ExportStep::SubmitEmail,
        ExportStep::OpenDatabase,
        ExportStep::Search,
        ExportStep::CheckResults,
        ExportStep::ConfigureExport,
        ExportStep::Download,
        ExportStep::Complete,
    ];

    /// Status recorded when this step is rejected
    pub fn failure_status(self) -> IdentifierStatus {
        match self {
            ExportStep::ReachPortal | ExportStep::SubmitEmail => IdentifierStatus::GigalibError,
            ExportStep::OpenDatabase => IdentifierStatus::ScopusLoginError,
            ExportStep::Search | ExportStep::CheckResults => IdentifierStatus::ScopusSearchError,
            ExportStep::ConfigureExport | ExportStep::Download => {
                IdentifierStatus::ScopusExportError
            }
            ExportStep::Complete => IdentifierStatus::Failed,
        }
    }

    /// Outer time budget for the step
    pub fn budget(self, timeouts: &StepTimeouts) -> Duration {
        match self {
            ExportStep::ReachPortal
            | ExportStep::SubmitEmail
            | ExportStep::OpenDatabase
            | ExportStep::ConfigureExport
            | ExportStep::Complete => timeouts.navigation + timeouts.element,
            ExportStep::Search | ExportStep::CheckResults => timeouts.search + timeouts.element,
            ExportStep::Download => timeouts.download + timeouts.element,
        }
    }

    /// Short name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStep::ReachPortal => "reach_portal",
            ExportStep::SubmitEmail => "submit_email",
            ExportStep::OpenDatabase => "open_database",
            ExportStep::Search => "search",
            ExportStep::CheckResults => "check_results",
            ExportStep::ConfigureExport => "configure_export",
            ExportStep::Download => "download",
            ExportStep::Complete => "complete",
        }
    }
}

impl std::fmt::Display for ExportStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a step could not be passed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// The page was not what the step expected; classified by the step
    #[error("{0}")]
    Rejected(String),

    /// A wait ran out of time; recorded as `FAILED`
    #[error("{0}")]
    Timeout(String),

    /// Anything else; recorded as `FAILED`
    #[error("{0}")]
    Unexpected(String),
}

impl From<BrowserError> for StepError {
    fn from(e: BrowserError) -> Self {
        match e {
            BrowserError::Timeout { .. } | BrowserError::ElementNotFound { .. } => {
                StepError::Timeout(e.to_string())
            }
            other => StepError::Unexpected(other.to_string()),
        }
    }
}

impl From<std::io::Error> for StepError {
    fn from(e: std::io::Error) -> Self {
        StepError::Unexpected(e.to_string())
    }
}

/// Result of a single session step
pub type StepResult<T> = std::result::Result<T, StepError>;

/// A live browser session able to perform each workflow step
///
/// Implementations hold whatever page state they need between steps. The
/// workflow calls the methods strictly in order and calls [`close`] exactly
/// once at the end.
///
/// [`close`]: ExportSession::close
#[async_trait]
pub trait ExportSession: Send {
    /// Open the portal entry URL and reach the email gate
    async fn reach_portal(&mut self) -> StepResult<()>;

    /// Submit the operator email and reach the portal search page
    async fn submit_email(&mut self, email: &str) -> StepResult<()>;

    /// Open the database through the portal link, switching to the new window
    async fn open_database(&mut self) -> StepResult<()>;

    /// Enter and submit the advanced search expression
    async fn search(&mut self, query: &str) -> StepResult<()>;

    /// Whether the results page lists any documents
    async fn has_results(&mut self) -> StepResult<bool>;

    /// Open the CSV export dialog, choose a document range and read its limits
    async fn open_export_dialog(&mut self) -> StepResult<ExportLimitHints>;

    /// Set the range to `[1, range_end]` and tick the metadata categories
    async fn configure_export(&mut self, range_end: u32, categories: &[String]) -> StepResult<()>;

    /// Submit the export and save the file at `destination`
    async fn download(&mut self, destination: &Path) -> StepResult<()>;

    /// URL of the active page, if known
    async fn current_url(&mut self) -> Option<String>;

    /// End the session; never fails
    async fn close(&mut self);
}

/// Starts browser sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Start a fresh session
    ///
    /// Failures here are transient (`BrowserError::SessionStart`) and the
    /// unit of work may retry them.
    async fn start(&self) -> crate::Result<Box<dyn ExportSession>>;

    /// Name of the browser driver
    fn name(&self) -> &'static str;
}

/// The identifier a workflow runs for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    /// Owning batch
    pub batch_id: BatchId,
    /// Identifier record
    pub identifier_id: IdentifierId,
    /// Normalized code
    pub code: String,
}

/// How a workflow run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// The export was saved
    Completed {
        /// Saved file
        path: PathBuf,
        /// Data rows in the file
        article_count: u64,
    },
    /// The search matched nothing
    NoResults,
    /// A step failed
    Failed {
        /// Status to record
        status: IdentifierStatus,
        /// Step that failed
        step: ExportStep,
        /// Truncated message to record
        message: String,
    },
}

impl WorkflowOutcome {
    /// Terminal status to record
    pub fn status(&self) -> IdentifierStatus {
        match self {
            WorkflowOutcome::Completed { .. } => IdentifierStatus::Completed,
            WorkflowOutcome::NoResults => IdentifierStatus::NoResults,
            WorkflowOutcome::Failed { status, .. } => *status,
        }
    }

    /// Rows exported, where known
    pub fn article_count(&self) -> Option<u64> {
        match self {
            WorkflowOutcome::Completed { article_count, .. } => Some(*article_count),
            WorkflowOutcome::NoResults => Some(0),
            WorkflowOutcome::Failed { .. } => None,
        }
    }

    /// Database update recording this outcome
    pub fn to_update(&self) -> StatusUpdate {
        match self {
            WorkflowOutcome::Completed {
                path,
                article_count,
            } => StatusUpdate {
                status: IdentifierStatus::Completed,
                result_path: Some(path.display().to_string()),
                article_count: Some(i64::try_from(*article_count).unwrap_or(i64::MAX)),
                error_message: None,
            },
            WorkflowOutcome::NoResults => StatusUpdate {
                article_count: Some(0),
                ..StatusUpdate::status(IdentifierStatus::NoResults)
            },
            WorkflowOutcome::Failed {
                status, message, ..
            } => StatusUpdate::failed(*status, message.clone()),
        }
    }
}

/// Drives an [`ExportSession`] through the export steps
#[derive(Debug, Clone)]
pub struct ExportWorkflow {
    operator_email: String,
    database_host_fragment: String,
    search: SearchConfig,
    export: ExportConfig,
    timeouts: StepTimeouts,
    results_dir: PathBuf,
}

impl ExportWorkflow {
    /// Build a workflow from the service configuration
    pub fn new(config: &Config) -> Self {
        Self {
            operator_email: config.portal.operator_email.clone(),
            database_host_fragment: config.portal.database_host_fragment.clone(),
            search: config.search.clone(),
            export: config.export.clone(),
            timeouts: config.browser.timeouts.clone(),
            results_dir: config.persistence.results_dir.clone(),
        }
    }

    /// Run every step for `job`, closing the session afterwards
    pub async fn run(&self, mut session: Box<dyn ExportSession>, job: &ExportJob) -> WorkflowOutcome {
        let outcome = match self.drive(session.as_mut(), job).await {
            Ok(outcome) => outcome,
            Err((step, error)) => {
                let url = session
                    .current_url()
                    .await
                    .unwrap_or_else(|| "N/A".to_string());
                classify_failure(step, error, &url)
            }
        };

        session.close().await;

        match &outcome {
            WorkflowOutcome::Completed {
                path,
                article_count,
            } => tracing::info!(
                code = %job.code,
                path = %path.display(),
                article_count,
                "export completed"
            ),
            WorkflowOutcome::NoResults => {
                tracing::info!(code = %job.code, "search matched no documents")
            }
            WorkflowOutcome::Failed {
                status,
                step,
                message,
            } => tracing::error!(
                code = %job.code,
                step = %step,
                status = status.as_str(),
                error = %message,
                "export failed"
            ),
        }

        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn ExportSession,
        job: &ExportJob,
    ) -> Result<WorkflowOutcome, (ExportStep, StepError)> {
        self.step(ExportStep::ReachPortal, &job.code, session.reach_portal())
            .await?;

        self.step(
            ExportStep::SubmitEmail,
            &job.code,
            session.submit_email(&self.operator_email),
        )
        .await?;

        self.step(ExportStep::OpenDatabase, &job.code, session.open_database())
            .await?;
        let landed = session.current_url().await.unwrap_or_default();
        if !landed.contains(&self.database_host_fragment) {
            return Err((
                ExportStep::OpenDatabase,
                StepError::Rejected(format!("Did not land on Scopus. URL: {}", landed)),
            ));
        }

        let query = build_search_query(&job.code, &self.search);
        self.step(ExportStep::Search, &job.code, session.search(&query))
            .await?;

        let has_results = self
            .step(ExportStep::CheckResults, &job.code, session.has_results())
            .await?;
        if !has_results {
            return Ok(WorkflowOutcome::NoResults);
        }

        let hints = self
            .step(
                ExportStep::ConfigureExport,
                &job.code,
                session.open_export_dialog(),
            )
            .await?;
        let range_end = resolve_export_limit(&hints, self.export.default_max_documents);
        tracing::debug!(code = %job.code, range_end, "export range resolved");
        self.step(
            ExportStep::ConfigureExport,
            &job.code,
            session.configure_export(range_end, &self.export.categories),
        )
        .await?;

        let path = export_path(&self.results_dir, job.batch_id, &job.code);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                (
                    ExportStep::Download,
                    StepError::Rejected(format!("Failed to create {}: {}", parent.display(), e)),
                )
            })?;
        }
        self.step(ExportStep::Download, &job.code, session.download(&path))
            .await?;

        let article_count = match count_data_rows(&path).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(code = %job.code, error = %e, "could not count exported rows");
                0
            }
        };

        Ok(WorkflowOutcome::Completed {
            path,
            article_count,
        })
    }

    /// Run one step under its time budget, tagging failures with the step
    async fn step<T>(
        &self,
        step: ExportStep,
        code: &str,
        action: impl std::future::Future<Output = StepResult<T>>,
    ) -> Result<T, (ExportStep, StepError)> {
        tracing::debug!(code, step = %step, "workflow step");
        let budget = step.budget(&self.timeouts);
        match tokio::time::timeout(budget, action).await {
            Ok(result) => result.map_err(|e| (step, e)),
            Err(_) => Err((
                step,
                StepError::Timeout(format!(
                    "step {} exceeded {}s",
                    step,
                    budget.as_secs()
                )),
            )),
        }
    }
}

fn classify_failure(step: ExportStep, error: StepError, url: &str) -> WorkflowOutcome {
    let (status, message) = match error {
        StepError::Rejected(message) => (
            step.failure_status(),
            truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS),
        ),
        StepError::Timeout(message) => (
            IdentifierStatus::Failed,
            format!("Timeout on {}: {}", url, truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS)),
        ),
        StepError::Unexpected(message) => (
            IdentifierStatus::Failed,
            format!("General error: {}", truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS)),
        ),
    };

    WorkflowOutcome::Failed {
        status,
        step,
        message,
    }
}

/// First `max` characters of `s`
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod testing;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
