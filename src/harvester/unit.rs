//! One identifier's unit of work: VPN gate, browser session, workflow.

use crate::db::StatusUpdate;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{Event, IdentifierId, IdentifierStatus};
use crate::workflow::{ExportJob, MAX_ERROR_MESSAGE_CHARS, truncate_chars};

use super::Harvester;

impl Harvester {
    /// Run the export workflow for one identifier and record its outcome
    ///
    /// The identifier goes to `PROCESSING` under a fresh task token, the VPN
    /// is dialed while holding the VPN lock, and a browser session is started
    /// (retried on transient failure). Every path ends in a terminal status
    /// written to the database. A failed VPN gate records `VPN_ERROR` without
    /// starting a browser.
    ///
    /// Returns the recorded status.
    pub async fn process_identifier(&self, id: IdentifierId) -> Result<IdentifierStatus> {
        let row = self
            .db
            .get_identifier(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("identifier {}", id)))?;

        let job = ExportJob {
            batch_id: row.batch(),
            identifier_id: id,
            code: row.code.clone(),
        };

        let task_id = format!(
            "{}-{}-{:08x}",
            job.batch_id,
            id,
            rand::random::<u32>()
        );
        self.db.set_task_id(id, &task_id).await?;
        self.db
            .update_identifier_status(id, &StatusUpdate::status(IdentifierStatus::Processing))
            .await?;
        self.emit_event(Event::IdentifierStarted {
            id,
            batch_id: job.batch_id,
            code: job.code.clone(),
        });

        tracing::info!(
            batch_id = job.batch_id.0,
            identifier_id = id.0,
            code = %job.code,
            task_id = %task_id,
            "Unit of work started"
        );

        let update = {
            let _vpn = self.vpn_lock.lock().await;
            self.run_behind_gate(&job).await
        };

        self.db.update_identifier_status(id, &update).await?;
        self.emit_event(Event::IdentifierFinished {
            id,
            batch_id: job.batch_id,
            code: job.code.clone(),
            status: update.status,
            article_count: update.article_count,
        });

        tracing::info!(
            batch_id = job.batch_id.0,
            identifier_id = id.0,
            code = %job.code,
            status = update.status.as_str(),
            "Unit of work finished"
        );

        Ok(update.status)
    }

    /// Everything that needs the VPN connection. The caller holds the VPN lock.
    async fn run_behind_gate(&self, job: &ExportJob) -> StatusUpdate {
        if !self.gate.acquire().await {
            let message = self.gate.failure_message();
            tracing::error!(
                identifier_id = job.identifier_id.0,
                code = %job.code,
                gate = self.gate.name(),
                "VPN gate not acquired"
            );
            return StatusUpdate::failed(IdentifierStatus::VpnError, message);
        }

        let update = match with_retry(&self.config.retry, || self.sessions.start()).await {
            Ok(session) => self.workflow.run(session, job).await.to_update(),
            Err(e) => {
                tracing::error!(
                    identifier_id = job.identifier_id.0,
                    code = %job.code,
                    error = %e,
                    "Browser session could not be started"
                );
                StatusUpdate::failed(
                    IdentifierStatus::Failed,
                    format!(
                        "General error: {}",
                        truncate_chars(&e.to_string(), MAX_ERROR_MESSAGE_CHARS)
                    ),
                )
            }
        };

        self.gate.release().await;
        update
    }
}
