//! Shared test helpers for creating Harvester instances in tests.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tempfile::tempdir;

use crate::config::Config;
use crate::harvester::Harvester;
use crate::types::{BatchId, BatchStatus, Event};
use crate::vpn::VpnGate;
use crate::workflow::testing::{Script, ScriptedFactory};

/// VPN gate double that answers with a fixed result and counts calls
pub(crate) struct FakeGate {
    connects: AtomicBool,
    pub(crate) acquired: AtomicU32,
    pub(crate) released: AtomicU32,
}

impl FakeGate {
    pub(crate) fn new(connects: bool) -> Self {
        Self {
            connects: AtomicBool::new(connects),
            acquired: AtomicU32::new(0),
            released: AtomicU32::new(0),
        }
    }

    pub(crate) fn acquired(&self) -> u32 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> u32 {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VpnGate for FakeGate {
    async fn acquire(&self) -> bool {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.connects.load(Ordering::SeqCst)
    }

    async fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Everything a harvester test needs to inspect
pub(crate) struct TestHarvester {
    pub(crate) harvester: Harvester,
    pub(crate) sessions: Arc<ScriptedFactory>,
    pub(crate) gate: Arc<FakeGate>,
    /// Keeps the database and results directory alive
    pub(crate) dir: tempfile::TempDir,
}

/// Config rooted in `dir` with a short retry delay
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("harvester.db");
    config.persistence.results_dir = dir.join("results");
    config.browser.download_dir = dir.join("downloads");
    config.portal.operator_email = "ops@example.org".into();
    config.retry.initial_delay = Duration::from_millis(10);
    config
}

/// Harvester backed by a scripted browser and a fake VPN gate
pub(crate) async fn create_test_harvester(script: Script, vpn_connects: bool) -> TestHarvester {
    let dir = tempdir().unwrap();
    create_test_harvester_with(test_config(dir.path()), dir, ScriptedFactory::new(script), vpn_connects)
        .await
}

pub(crate) async fn create_test_harvester_with(
    config: Config,
    dir: tempfile::TempDir,
    sessions: ScriptedFactory,
    vpn_connects: bool,
) -> TestHarvester {
    let sessions = Arc::new(sessions);
    let gate = Arc::new(FakeGate::new(vpn_connects));
    let harvester = Harvester::with_components(config, gate.clone(), sessions.clone())
        .await
        .unwrap();

    TestHarvester {
        harvester,
        sessions,
        gate,
        dir,
    }
}

/// CSV upload with one ISSN per row under an `ISSN` header
pub(crate) fn issn_csv(values: &[&str]) -> Vec<u8> {
    let mut csv = String::from("Title,ISSN\n");
    for (i, value) in values.iter().enumerate() {
        csv.push_str(&format!("Journal {},{}\n", i, value));
    }
    csv.into_bytes()
}

/// Wait until `batch_id` reaches a terminal status, returning it
pub(crate) async fn wait_for_batch(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    batch_id: BatchId,
) -> BatchStatus {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await.unwrap() {
                Event::BatchStatusChanged { id, status }
                    if id == batch_id && status != BatchStatus::Processing =>
                {
                    return status;
                }
                _ => {}
            }
        }
    })
    .await
    .expect("batch did not finish in time")
}
