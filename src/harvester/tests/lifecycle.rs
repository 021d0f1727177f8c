use super::*;
use crate::Error;
use crate::db::StatusUpdate;
use crate::types::BatchStatus;
use crate::workflow::testing::{Script, ScriptedFactory};
use std::time::Duration;

#[tokio::test]
async fn test_interrupted_work_is_recovered_on_restart() {
    let first = create_test_harvester(Script::default(), true).await;
    let report = first
        .harvester
        .upload_bytes("journals.csv", &issn_csv(&["01426001", "12345678"]))
        .await
        .unwrap();

    // simulate a crash in the middle of the first identifier
    let rows = first
        .harvester
        .db
        .list_identifiers(&IdentifierFilter {
            batch_id: Some(report.batch_id),
            status: None,
        })
        .await
        .unwrap();
    first
        .harvester
        .db
        .update_identifier_status(
            rows[0].identifier_id(),
            &StatusUpdate::status(IdentifierStatus::Processing),
        )
        .await
        .unwrap();

    let TestHarvester { harvester, dir, .. } = first;
    drop(harvester);

    let config = test_config(dir.path());
    let second =
        create_test_harvester_with(config, dir, ScriptedFactory::new(Script::default()), true)
            .await;

    assert_eq!(
        identifier_statuses(&second, report.batch_id).await,
        vec![IdentifierStatus::Pending, IdentifierStatus::Pending]
    );

    let mut events = second.harvester.subscribe();
    second.harvester.start_dispatcher();
    assert_eq!(
        wait_for_batch(&mut events, report.batch_id).await,
        BatchStatus::Completed
    );
    assert_eq!(second.sessions.starts(), 2);
}

#[tokio::test]
async fn test_shutdown_stops_the_dispatcher_and_marks_clean() {
    let t = create_test_harvester(Script::default(), true).await;
    let mut events = t.harvester.subscribe();
    let dispatcher = t.harvester.start_dispatcher();

    t.harvester.shutdown().await.unwrap();

    assert!(t.harvester.is_shutting_down());
    tokio::time::timeout(Duration::from_secs(5), dispatcher)
        .await
        .unwrap()
        .unwrap();
    assert!(!t.harvester.db.was_unclean_shutdown().await.unwrap());
    assert!(matches!(events.recv().await.unwrap(), crate::types::Event::Shutdown));

    let err = t.harvester.requeue(&[BatchId(1)]).await.unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
}

#[tokio::test]
async fn test_capabilities_name_the_components() {
    let t = create_test_harvester(Script::default(), true).await;
    let caps = t.harvester.capabilities();
    assert_eq!(caps.vpn_gate, "fake");
    assert!(caps.vpn_dials);
    assert_eq!(caps.browser, "scripted");
}

#[tokio::test]
async fn test_check_vpn_dials_and_releases() {
    let t = create_test_harvester(Script::default(), true).await;
    assert!(t.harvester.check_vpn().await);
    assert_eq!(t.gate.acquired(), 1);
    assert_eq!(t.gate.released(), 1);

    let t = create_test_harvester(Script::default(), false).await;
    assert!(!t.harvester.check_vpn().await);
    assert_eq!(t.gate.released(), 0);
}
