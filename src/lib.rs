//! # scopus-harvester
//!
//! Batch export of Scopus search results for lists of journal ISSNs.
//!
//! An operator uploads a spreadsheet with an `ISSN` column. Every valid,
//! unique ISSN becomes an identifier in a new batch, and a single dispatcher
//! works through the identifiers one at a time: dial the VPN, drive a browser
//! through the Gigalib portal into Scopus, search the ISSN, export the results
//! as CSV and record the outcome. Failed identifiers can be re-queued.
//!
//! ## Quick Start
//!
//! ```no_run
//! use scopus_harvester::{Config, Harvester};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.portal.operator_email = "ops@example.org".to_string();
//!
//!     let harvester = Harvester::new(config).await?;
//!     harvester.start_dispatcher();
//!
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = harvester.upload_file("journals.xlsx".as_ref()).await?;
//!     println!("batch {} is {}", report.batch_id, report.status);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// WebDriver browser automation
pub mod browser;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Batch dispatch and identifier processing
pub mod harvester;
/// Spreadsheet ingestion and ISSN validation
pub mod ingest;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// VPN gate strategies
pub mod vpn;
/// The Scopus export step sequence
pub mod workflow;

// Re-export commonly used types
pub use config::{Config, VpnStrategy};
pub use db::Database;
pub use error::{ApiError, BatchError, DatabaseError, Error, ErrorDetail, Result, ToHttpStatus};
pub use harvester::Harvester;
pub use types::{
    BatchId, BatchInfo, BatchStatus, Capabilities, Event, IdentifierId, IdentifierInfo,
    IdentifierStatus, ReportMessage, RequeueReport, StatusCounts, UploadReport,
};
pub use vpn::VpnGate;
pub use workflow::{ExportSession, SessionFactory};

/// Run until a termination signal arrives, then shut the harvester down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use scopus_harvester::{Config, Harvester, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let harvester = Harvester::new(Config::default()).await?;
///     harvester.start_dispatcher();
///
///     run_with_shutdown(&harvester).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(harvester: &Harvester) -> Result<()> {
    wait_for_signal().await;
    harvester.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
