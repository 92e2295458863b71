//! Tests for the parallel construct

use super::helpers::{recording_engine, run_err, run_ok};
use crate::interpreter::engine::Engine;
use crate::interpreter::executor::EngineSettings;
use crate::interpreter::report::Status;
use crate::interpreter::Error;
use indexmap::IndexMap;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn test_results_keyed_by_task_name() {
    let (engine, _) = recording_engine();
    let outcome = run_ok(
        &engine,
        r#"
        (import time)
        (step slow (body (time.sleep 0.05) (return "slow")))
        (step double (params x) (return (* x 2)))
        (run (parallel (a (slow)) (b (double 21))))
        "#,
        IndexMap::new(),
    )
    .await;

    assert_eq!(outcome.value.to_json(), json!({ "a": "slow", "b": 42 }));

    let report = &outcome.report;
    for task in ["a", "b"] {
        let starts = report
            .events_of("task_start")
            .into_iter()
            .filter(|e| e.step.as_deref() == Some(task))
            .count();
        assert_eq!(starts, 1, "task_start for {}", task);

        let end = report
            .events_of("task_end")
            .into_iter()
            .find(|e| e.step.as_deref() == Some(task))
            .expect("task_end");
        assert_eq!(end.status, Some(Status::Ok));
        assert!(end.duration_ms.is_some());
    }
    assert_eq!(report.step_summaries("slow").len(), 1);
    assert_eq!(report.step_summaries("double").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tasks_see_scope_snapshot() {
    let outcome = run_ok(
        &Engine::new(),
        r#"
        (run (block
          (set base 10)
          (set out (parallel (x (+ base 1)) (y (str base))))
          (return out)))
        "#,
        IndexMap::new(),
    )
    .await;
    assert_eq!(outcome.value.to_json(), json!({ "x": 11, "y": "10" }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_first_failure_cancels_remaining_tasks() {
    let (engine, _) = recording_engine();
    let engine = engine.with_settings(EngineSettings {
        parallel_workers: 1,
        ..EngineSettings::default()
    });

    let failure = run_err(
        &engine,
        r#"
        (step bad (body (vbl.ensure false "task broke") (return 0)))
        (step good (return 1))
        (run (parallel (a (bad)) (b (good)) (c (good))))
        "#,
        IndexMap::new(),
    )
    .await;

    let Error::ParallelTaskFailed { task, source } = &failure.error else {
        unreachable!("Expected ParallelTaskFailed, got {:?}", failure.error);
    };
    assert_eq!(task, "a");
    assert_eq!(source.kind(), "RetryExhausted");
    assert_eq!(failure.error.root_cause().describe(), "ValueError: task broke");

    let cancelled: Vec<&str> = failure
        .report
        .events_of("task_end")
        .into_iter()
        .filter(|e| e.status == Some(Status::Cancelled))
        .filter_map(|e| e.step.as_deref())
        .collect();
    assert_eq!(cancelled, vec!["b", "c"]);
    assert!(failure.report.step_summaries("good").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_parallel_failure_can_be_suppressed() {
    let outcome = run_ok(
        &Engine::new(),
        r#"
        (run (block
          (set result "none")
          (with ((vbl.suppress "ValueError"))
            (do (set result (parallel (a (vbl.ensure false "x"))))))
          (return result)))
        "#,
        IndexMap::new(),
    )
    .await;
    assert_eq!(outcome.value.to_json(), json!("none"));
}
