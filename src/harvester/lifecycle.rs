//! Startup recovery and shutdown coordination.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::{BatchStatus, Event};

use super::Harvester;

/// How long shutdown waits for a running unit of work to give up the VPN
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl Harvester {
    /// Put interrupted work back on the queue
    ///
    /// Identifiers stranded in `PROCESSING` are returned to `PENDING`, and
    /// every batch still marked `PROCESSING` is re-enqueued so the dispatcher
    /// finishes it once started.
    pub(crate) async fn recover(&self) -> Result<()> {
        let mut batches: BTreeSet<_> = self.db.recover_interrupted().await?.into_iter().collect();
        let stranded = batches.len();

        for batch in self.db.list_batches().await? {
            if batch.status() == BatchStatus::Processing {
                batches.insert(batch.batch_id());
            }
        }

        if batches.is_empty() {
            tracing::debug!("No interrupted batches to recover");
            return Ok(());
        }

        tracing::info!(
            batches = batches.len(),
            with_stranded_identifiers = stranded,
            "Re-enqueueing interrupted batches"
        );
        for batch_id in batches {
            self.enqueue(batch_id);
        }
        Ok(())
    }

    /// Gracefully shut down the harvester
    ///
    /// 1. Stops accepting uploads and re-queues
    /// 2. Signals the dispatcher to stop taking new work
    /// 3. Waits (up to 30 seconds) for a running unit of work to release the VPN
    /// 4. Marks a clean shutdown in the database
    ///
    /// A unit of work still running after the timeout keeps going, bounded by
    /// its step timeouts; its identifier is recovered on the next start if
    /// the process exits first.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.dispatch.accepting_new.store(false, Ordering::SeqCst);
        self.dispatch.shutdown.cancel();
        tracing::info!("Stopped accepting new work");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.vpn_lock.lock()).await {
            Ok(_guard) => tracing::info!("No unit of work running"),
            Err(_) => tracing::warn!("Timeout waiting for running unit of work, proceeding with shutdown"),
        }

        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
        } else {
            tracing::info!("Marked clean shutdown in database");
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.dispatch.shutdown.is_cancelled()
    }
}
