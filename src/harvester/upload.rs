//! Spreadsheet ingestion into a new batch.

use std::sync::atomic::Ordering;

use crate::db::NewBatch;
use crate::error::{Error, Result, UploadError};
use crate::ingest;
use crate::types::{BatchId, BatchStatus, Event, ReportMessage, UploadReport};

use super::Harvester;

impl Harvester {
    /// Ingest an uploaded spreadsheet as a new batch
    ///
    /// A batch row is always created so the operator can see what happened
    /// to the upload. When at least one valid, unique ISSN was found the
    /// batch goes to `PROCESSING` and is handed to the dispatcher; otherwise
    /// it is marked `FAILED` with an explanatory note and nothing runs.
    ///
    /// # Errors
    ///
    /// Only storage failures and [`Error::ShuttingDown`] are errors. An
    /// unreadable file or a missing ISSN column is reported through the
    /// returned [`UploadReport`].
    pub async fn upload_bytes(&self, filename: &str, bytes: &[u8]) -> Result<UploadReport> {
        if !self.dispatch.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let batch_id = self
            .db
            .insert_batch(&NewBatch {
                original_filename: Some(filename.to_string()),
                status: BatchStatus::Pending,
                notes: None,
            })
            .await?;

        tracing::info!(batch_id = batch_id.0, filename, "Batch created from upload");

        let mut report = UploadReport {
            batch_id,
            status: BatchStatus::Failed,
            created: Vec::new(),
            invalid: Vec::new(),
            duplicates: Vec::new(),
            messages: Vec::new(),
        };

        let raw_values = match ingest::read_identifier_column(filename, bytes) {
            Ok(values) => values,
            Err(Error::Upload(UploadError::MissingIdentifierColumn { .. })) => {
                report
                    .messages
                    .push(ReportMessage::error("Spreadsheet must contain an 'ISSN' column."));
                return self
                    .fail_upload(report, "Missing 'ISSN' column in uploaded file.")
                    .await;
            }
            Err(e) => {
                tracing::error!(batch_id = batch_id.0, filename, error = %e, "Failed to read upload");
                let text = format!("Error processing spreadsheet: {}", e);
                report.messages.push(ReportMessage::error(text.clone()));
                return self.fail_upload(report, &text).await;
            }
        };

        if raw_values.is_empty() {
            report
                .messages
                .push(ReportMessage::warning("No valid ISSNs found in the 'ISSN' column."));
            return self
                .fail_upload(report, "No ISSNs found in the 'ISSN' column.")
                .await;
        }

        let existing = self.db.batch_codes(batch_id).await?;
        let validated = ingest::validate_codes(&raw_values, &existing);

        for code in &validated.accepted {
            self.db.insert_identifier(batch_id, code).await?;
        }

        if !validated.invalid.is_empty() {
            report.messages.push(ReportMessage::warning(format!(
                "Skipped invalid ISSN formats: {}",
                validated.invalid.join(", ")
            )));
        }
        if !validated.duplicates.is_empty() {
            report.messages.push(ReportMessage::warning(format!(
                "Skipped duplicate ISSNs: {}",
                validated.duplicates.join(", ")
            )));
        }

        report.created = validated.accepted;
        report.invalid = validated.invalid;
        report.duplicates = validated.duplicates;

        if report.created.is_empty() {
            report
                .messages
                .push(ReportMessage::error("No valid, unique ISSNs found to process."));
            let note = format!("No valid, unique ISSNs found to process from {}.", filename);
            return self.fail_upload(report, &note).await;
        }

        let created = report.created.len();
        let note = format!(
            "{} ISSNs queued from {}. Batch processing started.",
            created, filename
        );
        self.db
            .update_batch_status(batch_id, BatchStatus::Processing, Some(&note))
            .await?;
        report.status = BatchStatus::Processing;
        report.messages.push(ReportMessage::success(format!(
            "Successfully uploaded {}. Batch {} created with {} ISSNs and sent for processing.",
            filename, batch_id, created
        )));

        self.emit_event(Event::BatchCreated {
            id: batch_id,
            filename: Some(filename.to_string()),
            identifiers: created,
        });
        self.emit_event(Event::BatchStatusChanged {
            id: batch_id,
            status: BatchStatus::Processing,
        });
        self.enqueue(batch_id);

        tracing::info!(
            batch_id = batch_id.0,
            created,
            invalid = report.invalid.len(),
            duplicates = report.duplicates.len(),
            "Upload ingested"
        );

        Ok(report)
    }

    /// Read a spreadsheet from disk and ingest it
    pub async fn upload_file(&self, path: &std::path::Path) -> Result<UploadReport> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.upload_bytes(&filename, &bytes).await
    }

    async fn fail_upload(&self, mut report: UploadReport, note: &str) -> Result<UploadReport> {
        self.db
            .update_batch_status(report.batch_id, BatchStatus::Failed, Some(note))
            .await?;
        report.status = BatchStatus::Failed;

        tracing::warn!(batch_id = report.batch_id.0, note, "Upload produced no work");

        self.emit_event(Event::BatchCreated {
            id: report.batch_id,
            filename: None,
            identifiers: 0,
        });
        self.emit_event(Event::BatchStatusChanged {
            id: report.batch_id,
            status: BatchStatus::Failed,
        });
        Ok(report)
    }

    /// Hand a batch to the dispatcher
    pub(crate) fn enqueue(&self, batch_id: BatchId) {
        if self.dispatch.tx.send(batch_id).is_err() {
            tracing::warn!(batch_id = batch_id.0, "Batch queue closed, batch not dispatched");
        } else {
            tracing::debug!(batch_id = batch_id.0, "Batch enqueued");
        }
    }
}
