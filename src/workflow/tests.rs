use super::testing::{Script, ScriptedFactory};
use super::*;
use crate::config::Config;

fn config(results_dir: &Path) -> Config {
    let mut config = Config::default();
    config.portal.operator_email = "ops@example.org".into();
    config.persistence.results_dir = results_dir.to_path_buf();
    config
}

fn job() -> ExportJob {
    ExportJob {
        batch_id: BatchId(4),
        identifier_id: IdentifierId(17),
        code: "01426001".into(),
    }
}

async fn run_script(script: Script, config: &Config) -> (WorkflowOutcome, ScriptedFactory) {
    let factory = ScriptedFactory::new(script);
    let session = factory.start().await.unwrap();
    let outcome = ExportWorkflow::new(config).run(session, &job()).await;
    (outcome, factory)
}

#[tokio::test]
async fn full_run_saves_and_counts_the_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let (outcome, factory) = run_script(Script::default(), &config).await;

    let expected_path = dir
        .path()
        .join("batch_4")
        .join("01426001")
        .join("scopus_export_01426001.csv");
    assert_eq!(
        outcome,
        WorkflowOutcome::Completed {
            path: expected_path.clone(),
            article_count: 3,
        }
    );
    assert!(expected_path.exists());

    let log = factory.log.lock().unwrap();
    assert_eq!(
        log.calls,
        vec![
            "reach_portal",
            "submit_email",
            "open_database",
            "search",
            "has_results",
            "open_export_dialog",
            "configure_export",
            "download",
        ]
    );
    assert_eq!(log.email.as_deref(), Some("ops@example.org"));
    assert_eq!(log.queries, vec![build_search_query("01426001", &config.search)]);
    assert_eq!(log.range_end, Some(3), "the result count caps the range");
    assert_eq!(log.categories, config.export.categories);
    assert_eq!(log.closed, 1);
}

#[tokio::test]
async fn hundred_data_rows_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from("Authors,Title\n");
    for i in 0..100 {
        csv.push_str(&format!("Author {i},Title {i}\n"));
    }
    let script = Script {
        csv,
        ..Script::default()
    };

    let (outcome, _) = run_script(script, &config(dir.path())).await;
    assert_eq!(outcome.article_count(), Some(100));
    assert_eq!(outcome.status(), IdentifierStatus::Completed);
}

#[tokio::test]
async fn zero_results_end_without_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = Script {
        has_results: false,
        ..Script::default()
    };

    let (outcome, factory) = run_script(script, &config(dir.path())).await;

    assert_eq!(outcome, WorkflowOutcome::NoResults);
    assert_eq!(outcome.article_count(), Some(0));
    let log = factory.log.lock().unwrap();
    assert!(!log.calls.contains(&"download"));
    assert!(log.downloads.is_empty());
    assert_eq!(log.closed, 1);
    assert!(!dir.path().join("batch_4").exists());
}

#[tokio::test]
async fn rejections_are_classified_by_step() {
    let cases = [
        (ExportStep::ReachPortal, IdentifierStatus::GigalibError),
        (ExportStep::SubmitEmail, IdentifierStatus::GigalibError),
        (ExportStep::OpenDatabase, IdentifierStatus::ScopusLoginError),
        (ExportStep::Search, IdentifierStatus::ScopusSearchError),
        (ExportStep::ConfigureExport, IdentifierStatus::ScopusExportError),
        (ExportStep::Download, IdentifierStatus::ScopusExportError),
    ];

    for (step, expected) in cases {
        let dir = tempfile::tempdir().unwrap();
        let script = Script::failing(step, StepError::Rejected(format!("{} refused", step)));
        let (outcome, factory) = run_script(script, &config(dir.path())).await;

        assert_eq!(
            outcome,
            WorkflowOutcome::Failed {
                status: expected,
                step,
                message: format!("{} refused", step),
            },
            "step {step}"
        );
        assert_eq!(factory.log.lock().unwrap().closed, 1, "step {step}");
    }
}

#[tokio::test]
async fn later_steps_do_not_run_after_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let script = Script::failing(ExportStep::SubmitEmail, StepError::Rejected("no".into()));
    let (_, factory) = run_script(script, &config(dir.path())).await;

    assert_eq!(
        factory.log.lock().unwrap().calls,
        vec!["reach_portal", "submit_email"]
    );
}

#[tokio::test]
async fn landing_outside_the_database_is_a_login_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = Script {
        landing_url: "https://idp.example.org/login".into(),
        ..Script::default()
    };

    let (outcome, factory) = run_script(script, &config(dir.path())).await;

    assert_eq!(
        outcome,
        WorkflowOutcome::Failed {
            status: IdentifierStatus::ScopusLoginError,
            step: ExportStep::OpenDatabase,
            message: "Did not land on Scopus. URL: https://idp.example.org/login".into(),
        }
    );
    assert!(factory.log.lock().unwrap().queries.is_empty());
}

#[tokio::test]
async fn timeouts_are_failed_with_the_active_url() {
    let dir = tempfile::tempdir().unwrap();
    let script = Script::failing(
        ExportStep::Search,
        StepError::Timeout("waiting for button#advSearch".into()),
    );

    let (outcome, _) = run_script(script, &config(dir.path())).await;

    assert_eq!(
        outcome,
        WorkflowOutcome::Failed {
            status: IdentifierStatus::Failed,
            step: ExportStep::Search,
            message: "Timeout on https://www.scopus.com/search/form.uri: waiting for button#advSearch"
                .into(),
        }
    );
}

#[tokio::test]
async fn unexpected_errors_are_failed_and_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let long = "x".repeat(600);
    let script = Script::failing(ExportStep::ReachPortal, StepError::Unexpected(long));

    let (outcome, factory) = run_script(script, &config(dir.path())).await;

    match outcome {
        WorkflowOutcome::Failed {
            status, message, ..
        } => {
            assert_eq!(status, IdentifierStatus::Failed);
            assert!(message.starts_with("General error: xxx"));
            assert_eq!(
                message.chars().count(),
                "General error: ".len() + MAX_ERROR_MESSAGE_CHARS
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(factory.log.lock().unwrap().closed, 1);
}

#[tokio::test]
async fn stalled_step_times_out_on_its_budget() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.browser.timeouts.navigation = Duration::from_millis(20);
    config.browser.timeouts.search = Duration::from_millis(20);
    config.browser.timeouts.element = Duration::from_millis(20);
    let script = Script {
        stall_at: Some(ExportStep::Search),
        ..Script::default()
    };

    let (outcome, factory) = run_script(script, &config).await;

    match outcome {
        WorkflowOutcome::Failed {
            status,
            step,
            message,
        } => {
            assert_eq!(status, IdentifierStatus::Failed);
            assert_eq!(step, ExportStep::Search);
            assert!(message.starts_with("Timeout on https://www.scopus.com/"));
            assert!(message.contains("step search exceeded"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(factory.log.lock().unwrap().closed, 1);
}

#[tokio::test]
async fn unparseable_dialog_uses_default_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.export.default_max_documents = 750;
    let script = Script {
        hints: ExportLimitHints::default(),
        ..Script::default()
    };

    let (_, factory) = run_script(script, &config).await;
    assert_eq!(factory.log.lock().unwrap().range_end, Some(750));
}

#[test]
fn step_order_and_classification() {
    assert_eq!(ExportStep::ORDER.first(), Some(&ExportStep::ReachPortal));
    assert_eq!(ExportStep::ORDER.last(), Some(&ExportStep::Complete));
    for step in ExportStep::ORDER {
        let status = step.failure_status();
        assert!(status.is_terminal());
        assert!(!status.is_success());
    }
}

#[test]
fn browser_errors_map_to_step_errors() {
    let timeout: StepError = BrowserError::Timeout {
        what: "download".into(),
        seconds: 300,
    }
    .into();
    assert!(matches!(timeout, StepError::Timeout(_)));

    let missing: StepError = BrowserError::ElementNotFound {
        selector: "#searchfield".into(),
    }
    .into();
    assert!(matches!(missing, StepError::Timeout(_)));

    let other: StepError = BrowserError::Download("disk full".into()).into();
    assert!(matches!(other, StepError::Unexpected(_)));
}

#[test]
fn outcomes_become_status_updates() {
    let update = WorkflowOutcome::Completed {
        path: PathBuf::from("/r/batch_1/X/scopus_export_X.csv"),
        article_count: 12,
    }
    .to_update();
    assert_eq!(update.status, IdentifierStatus::Completed);
    assert_eq!(update.result_path.as_deref(), Some("/r/batch_1/X/scopus_export_X.csv"));
    assert_eq!(update.article_count, Some(12));
    assert_eq!(update.error_message, None);

    let update = WorkflowOutcome::NoResults.to_update();
    assert_eq!(update.status, IdentifierStatus::NoResults);
    assert_eq!(update.article_count, Some(0));
    assert_eq!(update.result_path, None);

    let update = WorkflowOutcome::Failed {
        status: IdentifierStatus::ScopusSearchError,
        step: ExportStep::Search,
        message: "no search box".into(),
    }
    .to_update();
    assert_eq!(update.status, IdentifierStatus::ScopusSearchError);
    assert_eq!(update.error_message.as_deref(), Some("no search box"));
}

#[test]
fn truncation_counts_characters() {
    assert_eq!(truncate_chars("abc", 5), "abc");
    assert_eq!(truncate_chars("abcdef", 3), "abc");
    assert_eq!(truncate_chars("دسترسی", 2), "دس");
}
