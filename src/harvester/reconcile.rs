//! Batch aggregation and operator re-queue.

use std::sync::atomic::Ordering;

use crate::error::{BatchError, Error, Result};
use crate::types::{BatchId, BatchStatus, Event, ReportMessage, RequeueReport, StatusCounts};

use super::Harvester;

/// Terminal status of a drained batch
///
/// `COMPLETED` when every identifier completed or had no results, `FAILED`
/// when none did (an empty batch included), `PARTIAL_COMPLETE` otherwise.
pub fn aggregate_status(counts: &StatusCounts) -> BatchStatus {
    let succeeded = counts.completed + counts.no_results;
    if counts.total > 0 && succeeded == counts.total {
        BatchStatus::Completed
    } else if succeeded == 0 {
        BatchStatus::Failed
    } else {
        BatchStatus::PartialComplete
    }
}

/// Operator-facing summary of a drained batch
pub fn summary_note(counts: &StatusCounts) -> String {
    format!(
        "{} completed, {} no results, {} failed",
        counts.completed, counts.no_results, counts.failed
    )
}

impl Harvester {
    /// Derive a batch's status from its identifiers
    ///
    /// A batch that still has pending or processing identifiers keeps its
    /// current status.
    pub async fn aggregate_batch(&self, batch_id: BatchId) -> Result<BatchStatus> {
        let batch = self
            .db
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("batch {}", batch_id)))?;

        let counts = self.db.batch_status_counts(batch_id).await?;
        if !counts.is_drained() {
            tracing::debug!(
                batch_id = batch_id.0,
                pending = counts.pending,
                processing = counts.processing,
                "Batch not drained, status unchanged"
            );
            return Ok(batch.status());
        }

        let status = aggregate_status(&counts);
        let note = summary_note(&counts);
        self.db
            .update_batch_status(batch_id, status, Some(&note))
            .await?;
        self.emit_event(Event::BatchStatusChanged {
            id: batch_id,
            status,
        });

        tracing::info!(
            batch_id = batch_id.0,
            status = status.as_str(),
            completed = counts.completed,
            no_results = counts.no_results,
            failed = counts.failed,
            "Batch finished"
        );

        Ok(status)
    }

    /// Re-queue the failed and pending identifiers of one batch
    ///
    /// Only batches in `PENDING`, `FAILED` or `PARTIAL_COMPLETE` are eligible.
    /// The batch's re-processable identifiers are reset to `PENDING` and the
    /// batch is handed back to the dispatcher; `COMPLETED` and `NO_RESULTS`
    /// identifiers are left alone. Returns the number of identifiers reset.
    ///
    /// # Errors
    ///
    /// [`BatchError::NotFound`], [`BatchError::NotRequeueable`] or
    /// [`BatchError::NothingToRequeue`] when the batch is left unchanged.
    pub async fn requeue_batch(&self, batch_id: BatchId) -> Result<usize> {
        if !self.dispatch.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let batch = self
            .db
            .get_batch(batch_id)
            .await?
            .ok_or(BatchError::NotFound { id: batch_id.0 })?;

        let status = batch.status();
        if !status.is_requeueable() {
            return Err(BatchError::NotRequeueable {
                id: batch_id.0,
                status: status.to_string(),
            }
            .into());
        }

        let reset = self.db.reset_for_requeue(batch_id).await?;
        if reset == 0 {
            return Err(BatchError::NothingToRequeue { id: batch_id.0 }.into());
        }

        let reset = usize::try_from(reset).unwrap_or(usize::MAX);
        let note = format!("Re-processing initiated for {} ISSNs.", reset);
        self.db
            .update_batch_status(batch_id, BatchStatus::Processing, Some(&note))
            .await?;

        self.emit_event(Event::BatchRequeued {
            id: batch_id,
            identifiers: reset,
        });
        self.emit_event(Event::BatchStatusChanged {
            id: batch_id,
            status: BatchStatus::Processing,
        });
        self.enqueue(batch_id);

        tracing::info!(batch_id = batch_id.0, identifiers = reset, "Batch re-queued");

        Ok(reset)
    }

    /// Re-queue several batches, reporting per batch instead of failing
    ///
    /// Batches that are unknown, ineligible or have nothing to re-process are
    /// skipped with a warning message.
    pub async fn requeue(&self, batch_ids: &[BatchId]) -> Result<RequeueReport> {
        if !self.dispatch.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let mut report = RequeueReport::default();

        for &batch_id in batch_ids {
            match self.requeue_batch(batch_id).await {
                Ok(reset) => {
                    report.requeued.push(batch_id);
                    report.identifiers_reset += reset;
                }
                Err(Error::Batch(e)) => {
                    tracing::info!(batch_id = batch_id.0, reason = %e, "Batch skipped for re-queue");
                    report.messages.push(ReportMessage::warning(skip_message(&e)));
                    report.skipped.push(batch_id);
                }
                Err(e) => return Err(e),
            }
        }

        if report.requeued.is_empty() {
            report.messages.push(ReportMessage::warning(
                "No batches were eligible for re-processing or had re-processable ISSNs.",
            ));
        } else {
            report.messages.push(ReportMessage::success(format!(
                "Successfully re-queued processing for {} batch(es).",
                report.requeued.len()
            )));
        }

        Ok(report)
    }

    /// Remove a batch and its identifiers
    ///
    /// Export files already written under the results directory are kept.
    /// A batch that is still `PROCESSING` is refused with [`BatchError::Busy`].
    pub async fn delete_batch(&self, batch_id: BatchId) -> Result<()> {
        let batch = self
            .db
            .get_batch(batch_id)
            .await?
            .ok_or(BatchError::NotFound { id: batch_id.0 })?;

        if batch.status() == BatchStatus::Processing {
            return Err(BatchError::Busy { id: batch_id.0 }.into());
        }

        self.db.delete_batch(batch_id).await?;
        tracing::info!(batch_id = batch_id.0, "Batch deleted");
        Ok(())
    }
}

fn skip_message(error: &BatchError) -> String {
    match error {
        BatchError::NotFound { id } => format!("Batch {} not found.", id),
        BatchError::NotRequeueable { id, status } => {
            format!("Batch {} is {} and cannot be re-processed.", id, status)
        }
        BatchError::NothingToRequeue { id } => {
            format!("Batch {} has no re-processable ISSN queries.", id)
        }
        BatchError::Busy { id } => format!("Batch {} is still processing.", id),
    }
}
