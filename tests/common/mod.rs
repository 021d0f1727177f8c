//! Common test utilities for scopus-harvester integration tests

use async_trait::async_trait;
use scopus_harvester::workflow::{ExportLimitHints, StepError, StepResult};
use scopus_harvester::{
    BatchId, BatchStatus, Config, Event, ExportSession, Harvester, SessionFactory, VpnGate,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Gate that connects for the first `connects` dials and fails afterwards
pub struct CountingGate {
    connects: AtomicU32,
    pub dials: AtomicU32,
}

impl CountingGate {
    pub fn new(connects: u32) -> Self {
        Self {
            connects: AtomicU32::new(connects),
            dials: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl VpnGate for CountingGate {
    async fn acquire(&self) -> bool {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn release(&self) {}

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Stand-in for the Scopus site, answering per ISSN
#[derive(Default)]
pub struct FakeScopus {
    /// Codes whose search matches nothing
    pub empty: HashSet<String>,
    /// Codes whose export dialog never shows up
    pub broken_export: HashSet<String>,
    /// Codes searched so far, in order
    pub searched: Mutex<Vec<String>>,
}

impl FakeScopus {
    pub fn with(empty: &[&str], broken_export: &[&str]) -> Self {
        Self {
            empty: empty.iter().map(|s| s.to_string()).collect(),
            broken_export: broken_export.iter().map(|s| s.to_string()).collect(),
            searched: Mutex::new(Vec::new()),
        }
    }

    pub fn searched(&self) -> Vec<String> {
        self.searched.lock().unwrap().clone()
    }
}

pub struct FakeFactory(pub Arc<FakeScopus>);

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn start(&self) -> scopus_harvester::Result<Box<dyn ExportSession>> {
        Ok(Box::new(FakeSession {
            site: Arc::clone(&self.0),
            code: None,
            url: None,
        }))
    }

    fn name(&self) -> &'static str {
        "fake-scopus"
    }
}

struct FakeSession {
    site: Arc<FakeScopus>,
    code: Option<String>,
    url: Option<String>,
}

#[async_trait]
impl ExportSession for FakeSession {
    async fn reach_portal(&mut self) -> StepResult<()> {
        self.url = Some("https://portal.example.org/login".into());
        Ok(())
    }

    async fn submit_email(&mut self, email: &str) -> StepResult<()> {
        if email.is_empty() {
            return Err(StepError::Rejected("empty email".into()));
        }
        Ok(())
    }

    async fn open_database(&mut self) -> StepResult<()> {
        self.url = Some("https://www.scopus.com/search/form.uri".into());
        Ok(())
    }

    async fn search(&mut self, query: &str) -> StepResult<()> {
        let code = query
            .strip_prefix("ISSN ( ")
            .and_then(|rest| rest.split(' ').next())
            .ok_or_else(|| StepError::Rejected(format!("unexpected query {query}")))?
            .to_string();
        self.site.searched.lock().unwrap().push(code.clone());
        self.code = Some(code);
        Ok(())
    }

    async fn has_results(&mut self) -> StepResult<bool> {
        Ok(!self.site.empty.contains(self.code.as_deref().unwrap_or_default()))
    }

    async fn open_export_dialog(&mut self) -> StepResult<ExportLimitHints> {
        if self
            .site
            .broken_export
            .contains(self.code.as_deref().unwrap_or_default())
        {
            return Err(StepError::Rejected("Export button not found".into()));
        }
        Ok(ExportLimitHints {
            title: Some("Export 2 documents".into()),
            max_attribute: None,
            hint: None,
        })
    }

    async fn configure_export(&mut self, _range_end: u32, _categories: &[String]) -> StepResult<()> {
        Ok(())
    }

    async fn download(&mut self, destination: &Path) -> StepResult<()> {
        tokio::fs::write(destination, "Authors,Title\nA,First\nB,Second\n")
            .await
            .map_err(|e| StepError::Unexpected(e.to_string()))
    }

    async fn current_url(&mut self) -> Option<String> {
        self.url.clone()
    }

    async fn close(&mut self) {}
}

/// Config rooted in `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("harvester.db");
    config.persistence.results_dir = dir.join("results");
    config.browser.download_dir = dir.join("downloads");
    config.portal.operator_email = "ops@example.org".into();
    config.retry.initial_delay = Duration::from_millis(10);
    config
}

pub async fn harvester(
    dir: &Path,
    gate: Arc<CountingGate>,
    site: Arc<FakeScopus>,
) -> Harvester {
    Harvester::with_components(test_config(dir), gate, Arc::new(FakeFactory(site)))
        .await
        .unwrap()
}

/// CSV with one ISSN per row under an `ISSN` header
pub fn issn_csv(values: &[&str]) -> Vec<u8> {
    let mut csv = String::from("Journal,ISSN\n");
    for (i, value) in values.iter().enumerate() {
        csv.push_str(&format!("Journal {i},{value}\n"));
    }
    csv.into_bytes()
}

/// Wait until `batch_id` leaves PROCESSING
pub async fn wait_for_batch(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    batch_id: BatchId,
) -> BatchStatus {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Event::BatchStatusChanged { id, status } = events.recv().await.unwrap()
                && id == batch_id
                && status != BatchStatus::Processing
            {
                return status;
            }
        }
    })
    .await
    .expect("batch did not finish in time")
}
