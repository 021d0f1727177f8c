//! Scripted browser double for workflow and harvester tests

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ExportLimitHints, ExportSession, ExportStep, SessionFactory, StepError, StepResult};
use crate::error::BrowserError;

/// How a scripted session behaves
#[derive(Debug, Clone)]
pub(crate) struct Script {
    /// Step that fails, and how
    pub fail_at: Option<(ExportStep, StepError)>,
    /// Step that never finishes
    pub stall_at: Option<ExportStep>,
    pub has_results: bool,
    pub hints: ExportLimitHints,
    /// URL reported once the database was opened
    pub landing_url: String,
    /// Contents written by `download`
    pub csv: String,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail_at: None,
            stall_at: None,
            has_results: true,
            hints: ExportLimitHints {
                title: Some("Export 3 documents".into()),
                max_attribute: None,
                hint: Some("You can export up to 20,000 documents".into()),
            },
            landing_url: "https://www.scopus.com/search/form.uri".into(),
            csv: "Authors,Title,Year\nA,One,2020\nB,Two,2021\nC,Three,2022\n".into(),
        }
    }
}

impl Script {
    pub(crate) fn failing(step: ExportStep, error: StepError) -> Self {
        Self {
            fail_at: Some((step, error)),
            ..Self::default()
        }
    }
}

/// Everything the sessions of one factory were asked to do
#[derive(Debug, Default)]
pub(crate) struct SessionLog {
    pub calls: Vec<&'static str>,
    pub email: Option<String>,
    pub queries: Vec<String>,
    pub range_end: Option<u32>,
    pub categories: Vec<String>,
    pub downloads: Vec<PathBuf>,
    pub closed: u32,
}

pub(crate) struct ScriptedSession {
    script: Script,
    log: Arc<Mutex<SessionLog>>,
    url: Option<String>,
}

impl ScriptedSession {
    pub(crate) fn new(script: Script, log: Arc<Mutex<SessionLog>>) -> Self {
        Self {
            script,
            log,
            url: None,
        }
    }

    async fn enter(&mut self, call: &'static str, step: ExportStep) -> StepResult<()> {
        self.log.lock().unwrap().calls.push(call);
        if self.script.stall_at == Some(step) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match &self.script.fail_at {
            Some((at, error)) if *at == step => Err(error.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ExportSession for ScriptedSession {
    async fn reach_portal(&mut self) -> StepResult<()> {
        self.url = Some("http://portal.test/getemail.aspx".into());
        self.enter("reach_portal", ExportStep::ReachPortal).await
    }

    async fn submit_email(&mut self, email: &str) -> StepResult<()> {
        self.log.lock().unwrap().email = Some(email.to_string());
        self.url = Some("http://pd.portal.test/search.aspx".into());
        self.enter("submit_email", ExportStep::SubmitEmail).await
    }

    async fn open_database(&mut self) -> StepResult<()> {
        self.enter("open_database", ExportStep::OpenDatabase).await?;
        self.url = Some(self.script.landing_url.clone());
        Ok(())
    }

    async fn search(&mut self, query: &str) -> StepResult<()> {
        self.log.lock().unwrap().queries.push(query.to_string());
        self.enter("search", ExportStep::Search).await
    }

    async fn has_results(&mut self) -> StepResult<bool> {
        self.enter("has_results", ExportStep::CheckResults).await?;
        Ok(self.script.has_results)
    }

    async fn open_export_dialog(&mut self) -> StepResult<ExportLimitHints> {
        self.enter("open_export_dialog", ExportStep::ConfigureExport)
            .await?;
        Ok(self.script.hints.clone())
    }

    async fn configure_export(&mut self, range_end: u32, categories: &[String]) -> StepResult<()> {
        {
            let mut log = self.log.lock().unwrap();
            log.calls.push("configure_export");
            log.range_end = Some(range_end);
            log.categories = categories.to_vec();
        }
        Ok(())
    }

    async fn download(&mut self, destination: &Path) -> StepResult<()> {
        self.enter("download", ExportStep::Download).await?;
        tokio::fs::write(destination, &self.script.csv).await?;
        self.log
            .lock()
            .unwrap()
            .downloads
            .push(destination.to_path_buf());
        Ok(())
    }

    async fn current_url(&mut self) -> Option<String> {
        self.url.clone()
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().closed += 1;
    }
}

/// Hands out scripted sessions; the first `failed_starts` starts fail
pub(crate) struct ScriptedFactory {
    script: Script,
    failed_starts: u32,
    starts: AtomicU32,
    pub log: Arc<Mutex<SessionLog>>,
}

impl ScriptedFactory {
    pub(crate) fn new(script: Script) -> Self {
        Self::with_failed_starts(script, 0)
    }

    pub(crate) fn with_failed_starts(script: Script, failed_starts: u32) -> Self {
        Self {
            script,
            failed_starts,
            starts: AtomicU32::new(0),
            log: Arc::new(Mutex::new(SessionLog::default())),
        }
    }

    /// Number of `start` calls, failed ones included
    pub(crate) fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn start(&self) -> crate::Result<Box<dyn ExportSession>> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        if n < self.failed_starts {
            return Err(BrowserError::SessionStart("connection refused".into()).into());
        }
        Ok(Box::new(ScriptedSession::new(
            self.script.clone(),
            self.log.clone(),
        )))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
