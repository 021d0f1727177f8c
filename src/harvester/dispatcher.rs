//! Dispatcher: the single consumer of the batch queue.
//!
//! Batches are worked through one at a time and, within a batch, identifiers
//! one at a time in creation order, so at most one export workflow runs in
//! the whole process.

use crate::error::Result;
use crate::types::{BatchId, BatchStatus, Event};

use super::Harvester;

impl Harvester {
    /// Start the dispatcher task
    ///
    /// The task runs until shutdown is signalled. Only one dispatcher can own
    /// the queue; a second call logs a warning and returns a finished task.
    pub fn start_dispatcher(&self) -> tokio::task::JoinHandle<()> {
        let harvester = self.clone();

        tokio::spawn(async move {
            let Some(mut rx) = harvester.dispatch.rx.lock().await.take() else {
                tracing::warn!("Dispatcher already running");
                return;
            };
            let shutdown = harvester.dispatch.shutdown.clone();

            tracing::info!("Dispatcher started");

            loop {
                let batch_id = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(id) => id,
                        None => break,
                    },
                };

                if let Err(e) = harvester.process_batch(batch_id).await {
                    tracing::error!(batch_id = batch_id.0, error = %e, "Batch processing failed");
                    let note = format!("Batch processing error: {}", e);
                    if let Err(e) = harvester
                        .db
                        .update_batch_status(batch_id, BatchStatus::Failed, Some(&note))
                        .await
                    {
                        tracing::error!(batch_id = batch_id.0, error = %e, "Failed to mark batch as failed");
                    }
                }
            }

            tracing::info!("Dispatcher stopped");
        })
    }

    /// Work through every pending identifier of a batch, then aggregate it
    ///
    /// Returns the batch's resulting status. When shutdown is signalled
    /// between identifiers the batch is left in `PROCESSING` with its
    /// remaining identifiers pending; startup recovery picks it up again.
    pub async fn process_batch(&self, batch_id: BatchId) -> Result<BatchStatus> {
        let Some(batch) = self.db.get_batch(batch_id).await? else {
            tracing::warn!(batch_id = batch_id.0, "Dispatched batch no longer exists");
            return Ok(BatchStatus::Failed);
        };

        if batch.status() != BatchStatus::Processing {
            self.db
                .update_batch_status(batch_id, BatchStatus::Processing, None)
                .await?;
            self.emit_event(Event::BatchStatusChanged {
                id: batch_id,
                status: BatchStatus::Processing,
            });
        }

        let pending = self.db.pending_identifier_ids(batch_id).await?;
        tracing::info!(
            batch_id = batch_id.0,
            pending = pending.len(),
            "Processing batch"
        );

        for identifier_id in pending {
            if self.dispatch.shutdown.is_cancelled() {
                tracing::info!(batch_id = batch_id.0, "Shutdown requested, leaving batch for recovery");
                return Ok(BatchStatus::Processing);
            }

            // An identifier may have been re-queued or deleted since the list was read
            match self.db.get_identifier(identifier_id).await? {
                Some(row) if row.status() == crate::types::IdentifierStatus::Pending => {}
                _ => continue,
            }

            if let Err(e) = self.process_identifier(identifier_id).await {
                tracing::error!(
                    batch_id = batch_id.0,
                    identifier_id = identifier_id.0,
                    error = %e,
                    "Unit of work failed"
                );
            }
        }

        self.aggregate_batch(batch_id).await
    }
}
