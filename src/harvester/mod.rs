//! Core harvester service split into focused submodules.
//!
//! The `Harvester` struct and its methods are organized by domain:
//! - [`upload`] - Spreadsheet ingestion into a new batch
//! - [`dispatcher`] - The single consumer of the batch queue
//! - [`unit`] - One identifier's unit of work (VPN, browser, workflow)
//! - [`reconcile`] - Batch aggregation and operator re-queue
//! - [`lifecycle`] - Startup recovery and shutdown coordination

mod dispatcher;
mod lifecycle;
mod reconcile;
mod unit;
mod upload;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use reconcile::{aggregate_status, summary_note};

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::browser::WebDriverSessionFactory;
use crate::config::Config;
use crate::db::Database;
use crate::error::{BatchError, Error, Result};
use crate::types::{BatchId, BatchInfo, Capabilities, Event};
use crate::vpn::{self, VpnGate};
use crate::workflow::{ExportWorkflow, SessionFactory};

/// Batch queue state shared by every clone of the harvester
#[derive(Clone)]
pub(crate) struct DispatchState {
    /// Producer side of the batch queue
    pub(crate) tx: mpsc::UnboundedSender<BatchId>,
    /// Consumer side, taken once by the dispatcher task
    pub(crate) rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<BatchId>>>>,
    /// Cancelled on shutdown; the dispatcher stops taking new work
    pub(crate) shutdown: CancellationToken,
    /// Set to false during shutdown so uploads and re-queues are refused
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl DispatchState {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(Some(rx))),
            shutdown: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Main harvester instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Harvester {
    /// Database instance for persistence
    /// Public for integration tests to query identifier status
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// VPN gate selected at startup
    pub(crate) gate: Arc<dyn VpnGate>,
    /// Opens browser sessions for the workflow
    pub(crate) sessions: Arc<dyn SessionFactory>,
    /// Step sequence run for every identifier
    pub(crate) workflow: ExportWorkflow,
    /// Held for the whole time a unit of work owns the VPN connection
    pub(crate) vpn_lock: Arc<Mutex<()>>,
    /// Batch queue and shutdown signalling
    pub(crate) dispatch: DispatchState,
}

impl Harvester {
    /// Create a harvester with the VPN gate and WebDriver session factory
    /// described by the configuration
    ///
    /// Opens (and migrates) the SQLite database, creates the results and
    /// download directories and recovers work interrupted by an unclean stop.
    /// The dispatcher is not started; call [`Harvester::start_dispatcher`].
    pub async fn new(config: Config) -> Result<Self> {
        let gate = vpn::gate_from_config(&config.vpn);
        let sessions = Arc::new(WebDriverSessionFactory::new(
            config.browser.clone(),
            config.portal.clone(),
        )?);
        Self::with_components(config, gate, sessions).await
    }

    /// Create a harvester around an explicit VPN gate and session factory
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use scopus_harvester::{Config, Harvester};
    /// use scopus_harvester::browser::WebDriverSessionFactory;
    /// use scopus_harvester::vpn::DisabledGate;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = Config::default();
    ///     let sessions = WebDriverSessionFactory::new(config.browser.clone(), config.portal.clone())?;
    ///     let harvester =
    ///         Harvester::with_components(config, Arc::new(DisabledGate), Arc::new(sessions)).await?;
    ///     harvester.start_dispatcher();
    ///     Ok(())
    /// }
    /// ```
    pub async fn with_components(
        config: Config,
        gate: Arc<dyn VpnGate>,
        sessions: Arc<dyn SessionFactory>,
    ) -> Result<Self> {
        create_dir(&config.persistence.results_dir, "results").await?;
        create_dir(&config.browser.download_dir, "download").await?;

        let db = Database::new(&config.persistence.database_path).await?;

        let unclean = db.was_unclean_shutdown().await?;
        if unclean {
            tracing::warn!("Previous run did not shut down cleanly");
        }
        db.set_clean_start().await?;

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        tracing::info!(
            vpn_gate = gate.name(),
            vpn_dials = gate.dials(),
            browser = sessions.name(),
            "Harvester initialized"
        );

        let harvester = Self {
            db: Arc::new(db),
            event_tx,
            workflow: ExportWorkflow::new(&config),
            config: Arc::new(config),
            gate,
            sessions,
            vpn_lock: Arc::new(Mutex::new(())),
            dispatch: DispatchState::new(),
        };

        harvester.recover().await?;

        Ok(harvester)
    }

    /// Subscribe to batch and identifier events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Which VPN gate and browser driver this instance uses
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            vpn_gate: self.gate.name().to_string(),
            vpn_dials: self.gate.dials(),
            browser: self.sessions.name().to_string(),
        }
    }

    /// Dial and release the VPN once, outside of any workflow
    ///
    /// Holds the VPN lock, so it waits for a running unit of work to finish.
    pub async fn check_vpn(&self) -> bool {
        let _vpn = self.vpn_lock.lock().await;
        let connected = self.gate.acquire().await;
        if connected {
            self.gate.release().await;
        }
        tracing::info!(gate = self.gate.name(), connected, "VPN check finished");
        connected
    }

    /// One batch with its identifier tally
    pub async fn batch_info(&self, batch_id: BatchId) -> Result<BatchInfo> {
        let batch = self
            .db
            .get_batch(batch_id)
            .await?
            .ok_or(BatchError::NotFound { id: batch_id.0 })?;
        let counts = self.db.batch_status_counts(batch_id).await?;
        Ok(batch.into_info(counts))
    }

    /// Every batch, newest first, with identifier tallies
    pub async fn list_batches(&self) -> Result<Vec<BatchInfo>> {
        let batches = self.db.list_batches().await?;
        let mut infos = Vec::with_capacity(batches.len());
        for batch in batches {
            let counts = self.db.batch_status_counts(batch.batch_id()).await?;
            infos.push(batch.into_info(counts));
        }
        Ok(infos)
    }

    /// Emit an event to all subscribers
    ///
    /// Events are dropped silently when nobody is listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(self: &Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let harvester = Arc::clone(self);
        let config = Arc::clone(&self.config);

        tokio::spawn(async move { crate::api::start_api_server(harvester, config).await })
    }
}

async fn create_dir(path: &std::path::Path, what: &str) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to create {} directory '{}': {}",
                what,
                path.display(),
                e
            ),
        ))
    })
}
