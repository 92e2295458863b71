//! Tests for the execution report produced by a run

use super::helpers::{recording_engine, run_err, run_ok};
use crate::interpreter::report::Status;
use indexmap::IndexMap;
use serde_json::json;

const SOURCE: &str = r#"
    (meta (name "report-demo") (version 2))
    (step greet (params who) (body (vbl.log "greeting" (kw who who)) (return (+ "hi " who))))
    (run (block (print "starting") (return (greet "ada"))))
"#;

#[tokio::test(flavor = "multi_thread")]
async fn test_report_json_shape() {
    let (engine, _) = recording_engine();
    let outcome = run_ok(&engine, SOURCE, IndexMap::new()).await;
    let report = outcome.report.to_json();

    for key in [
        "run_id",
        "meta",
        "program_hash",
        "started_at",
        "finished_at",
        "duration_ms",
        "status",
        "error",
        "steps",
        "events",
        "result",
    ] {
        assert!(report.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(report["meta"], json!({ "name": "report-demo", "version": 2 }));
    assert_eq!(report["status"], "ok");
    assert_eq!(report["result"], "hi ada");
    assert_eq!(report["steps"][0]["name"], "greet");
    assert_eq!(report["steps"][0]["attempts"], 1);
    assert_eq!(report["program_hash"].as_str().map(str::len), Some(64));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_events_in_causal_order() {
    let (engine, sink) = recording_engine();
    let outcome = run_ok(&engine, SOURCE, IndexMap::new()).await;

    let kinds: Vec<&str> = outcome.report.events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec!["run_start", "print", "step_start", "log", "step_end", "run_end"]
    );

    let log = &outcome.report.events_of("log")[0];
    assert_eq!(log.fields["message"], "greeting");
    assert_eq!(log.fields["who"], "ada");
    assert_eq!(outcome.report.events_of("print")[0].fields["message"], "starting");

    // the sink saw the same events
    assert_eq!(sink.events(), outcome.report.events);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_program_hash_is_stable() {
    let (engine, _) = recording_engine();
    let first = run_ok(&engine, SOURCE, IndexMap::new()).await.report;
    let second = run_ok(&engine, SOURCE, IndexMap::new()).await.report;

    assert_eq!(first.program_hash, second.program_hash);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_run_report() {
    let (engine, _) = recording_engine();
    let failure = run_err(
        &engine,
        r#"(step boom (body (raise (error "KeyError" "gone")) (return 1))) (run (boom))"#,
        IndexMap::new(),
    )
    .await;

    let report = &failure.report;
    assert_eq!(report.status, Status::Error);
    assert_eq!(
        report.error.as_deref(),
        Some("RetryExhausted: step 'boom' failed after 1 attempt(s): KeyError: gone")
    );
    assert!(report.finished_at.is_some());
    assert_eq!(report.steps[0].status, Status::Error);

    let end = report.events.last().expect("run_end");
    assert_eq!(end.kind, "run_end");
    assert_eq!(end.status, Some(Status::Error));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bind_failure_is_reported() {
    let (engine, _) = recording_engine();
    let failure = run_err(&engine, "(run (nope 1))", IndexMap::new()).await;

    assert_eq!(failure.error.kind(), "BindError");
    assert_eq!(failure.error.exit_code(), 2);
    assert_eq!(failure.report.status, Status::Error);
    assert!(failure.report.steps.is_empty());
}
