//! Tests for statements and structured control flow

use super::helpers::{eval, eval_err, recording_engine, run_err};
use crate::interpreter::report::Status;
use crate::interpreter::types::Val;
use crate::interpreter::Error;
use indexmap::IndexMap;
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn test_if_else() {
    let source = |n: i64| {
        format!(
            r#"(run (block (if (> {} 0) (then (return "pos")) (else (return "non-pos")))))"#,
            n
        )
    };
    assert_eq!(eval(&source(3)).await, Val::str("pos"));
    assert_eq!(eval(&source(-3)).await, Val::str("non-pos"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_for_with_break_and_continue() {
    let value = eval(
        r#"
        (run (block
          (set total 0)
          (for n (range 10) (do
            (if (== (% n 2) 0) (then (continue)))
            (if (> n 7) (then (break)))
            (set total (+ total n))))
          (return total)))
        "#,
    )
    .await;
    // 1 + 3 + 5 + 7
    assert_eq!(value, Val::Int(16));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_while_else_runs_only_without_break() {
    let value = eval(
        r#"
        (run (block
          (set i 0)
          (set hits (list))
          (while (< i 3) (do (set i (+ i 1))) (else (hits.append "finished")))
          (while true (do (break)) (else (hits.append "never")))
          (return (tuple i hits))))
        "#,
    )
    .await;
    assert_eq!(value.to_json(), json!([3, ["finished"]]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_return_from_inside_loop() {
    let value = eval(
        r#"
        (step find (params items target)
          (body
            (for item items (do (if (== item target) (then (return item)))))
            (return null)))
        (run (tuple (find (list 1 2 3) 2) (find (list 1) 9)))
        "#,
    )
    .await;
    assert_eq!(value.to_json(), json!([2, null]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_with_releases_on_error() {
    let (engine, _) = recording_engine();
    let failure = run_err(
        &engine,
        r#"
        (run (block
          (with ((vbl.span "load")) (do (vbl.ensure false "broken")))
          (return "unreachable")))
        "#,
        IndexMap::new(),
    )
    .await;

    assert_eq!(failure.error.describe(), "ValueError: broken");
    let ends = failure.report.events_of("span_end");
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].status, Some(Status::Error));
    assert_eq!(ends[0].error.as_deref(), Some("ValueError: broken"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_with_binds_alias_and_releases_in_reverse() {
    let (engine, sink) = recording_engine();
    let outcome = super::helpers::run_ok(
        &engine,
        r#"
        (run (block
          (with (((vbl.span "outer") a) ((vbl.span "inner") b))
            (do (set names (tuple (str a) (str b)))))
          (return names)))
        "#,
        IndexMap::new(),
    )
    .await;

    assert_eq!(outcome.value.to_json(), json!(["<resource outer>", "<resource inner>"]));
    let spans: Vec<(String, String)> = sink
        .events()
        .into_iter()
        .filter(|e| e.kind.starts_with("span_"))
        .map(|e| (e.kind.clone(), e.fields["label"].as_str().unwrap_or_default().to_string()))
        .collect();
    assert_eq!(
        spans,
        vec![
            ("span_start".to_string(), "outer".to_string()),
            ("span_start".to_string(), "inner".to_string()),
            ("span_end".to_string(), "inner".to_string()),
            ("span_end".to_string(), "outer".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_suppress_then_reraise() {
    let value = eval(
        r#"
        (run (block
          (with ((vbl.suppress "ValueError")) (do (vbl.ensure false "ignored")))
          (return "survived")))
        "#,
    )
    .await;
    assert_eq!(value, Val::str("survived"));

    let err = eval_err(
        r#"
        (run (block
          (with ((vbl.suppress "ValueError")) (do (vbl.ensure false "again")))
          (raise)))
        "#,
    )
    .await;
    assert_eq!(err.describe(), "ValueError: again");

    // kinds that do not match propagate
    let err = eval_err(r#"(run (block (with ((vbl.suppress "KeyError")) (do (/ 1 0)))))"#).await;
    assert_eq!(err.kind(), "ArithmeticError");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bare_raise_without_suppressed_error() {
    let err = eval_err("(run (block (raise)))").await;
    assert_eq!(err.describe(), "RuntimeError: no active error to re-raise");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_raise_values() {
    let err = eval_err(r#"(run (block (raise (error "KeyError" "missing"))))"#).await;
    assert_eq!(
        err,
        Error::Raised {
            kind: "KeyError".to_string(),
            message: "missing".to_string()
        }
    );

    let err = eval_err(r#"(run (block (raise "plain")))"#).await;
    assert_eq!(err.describe(), "RuntimeError: plain");

    let err = eval_err("(run (block (raise 3)))").await;
    assert_eq!(err.kind(), "TypeError");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_assert_messages() {
    let err = eval_err(r#"(run (block (assert (== 1 2) "numbers differ")))"#).await;
    assert_eq!(err.describe(), "AssertionError: numbers differ");

    let err = eval_err("(run (block (assert false)))").await;
    assert_eq!(err, Error::Assertion(None));

    assert_eq!(eval(r#"(run (block (assert true "fine") (return 1)))"#).await, Val::Int(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_determinism_of_pure_programs() {
    let source = r#"
        (step score (params word) (return (* (len word) 3)))
        (run (block
          (set out (dict))
          (for w (list "alpha" "be" "gamma") (do (out.update (dict (w (score w))))))
          (return (sorted (out.items)))))
    "#;
    let first = eval(source).await;
    let second = eval(source).await;
    assert_eq!(first, second);
    assert_eq!(first.to_json(), json!([["alpha", 15], ["be", 6], ["gamma", 15]]));
}
