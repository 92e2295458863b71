//! Tests for expression evaluation

use super::helpers::{eval, eval_err, run_err, run_ok};
use crate::interpreter::engine::Engine;
use crate::interpreter::host::ModelRegistry;
use crate::interpreter::types::Val;
use indexmap::IndexMap;
use maplit::hashmap;
use serde_json::json;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread")]
async fn test_arithmetic_and_comparison() {
    assert_eq!(eval("(run (+ 1 (* 2 3)))").await, Val::Int(7));
    assert_eq!(eval("(run (/ 7 2))").await, Val::Float(3.5));
    assert_eq!(eval("(run (// 7 2))").await, Val::Int(3));
    assert_eq!(eval("(run (< 1 2.5))").await, Val::Bool(true));
    assert_eq!(eval(r#"(run (in "b" (list "a" "b")))"#).await, Val::Bool(true));

    let err = eval_err("(run (/ 1 0))").await;
    assert_eq!(err.kind(), "ArithmeticError");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_oversized_sequences_fail_cleanly() {
    for source in [
        r#"(run (* "ab" 4611686018427387904))"#,
        r#"(run (* (list 1 2) 100000000000))"#,
        "(run (range 9223372036854775807))",
    ] {
        let err = eval_err(source).await;
        assert_eq!(err.kind(), "ArithmeticError", "{}", source);
    }
    assert_eq!(eval(r#"(run (* "ab" 2))"#).await, Val::str("abab"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_and_or_short_circuit() {
    assert_eq!(eval(r#"(run (or 0 "x"))"#).await, Val::str("x"));
    assert_eq!(eval("(run (and false (/ 1 0)))").await, Val::Bool(false));
    assert_eq!(eval("(run (or 1 (/ 1 0)))").await, Val::Int(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_string_methods() {
    let value = eval(
        r#"
        (run (block
          (set s " Hello, World ")
          (return ((attr (s.strip) lower)))))
        "#,
    )
    .await;
    assert_eq!(value, Val::str("hello, world"));

    let value = eval(r#"(run (block (set t "a-b-c") (return (t.split "-" (kw maxsplit 1)))))"#).await;
    assert_eq!(value, Val::List(vec![Val::str("a"), Val::str("b-c")]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_in_place_mutation() {
    let value = eval(
        r#"
        (run (block
          (set items (list 1 2))
          (items.append 3)
          (set d (dict ("a" 1)))
          (d.update (kw b 2))
          (return (tuple items d))))
        "#,
    )
    .await;

    let Val::Tuple(parts) = value else {
        unreachable!("Expected tuple, got {:?}", value);
    };
    assert_eq!(parts[0], Val::List(vec![Val::Int(1), Val::Int(2), Val::Int(3)]));
    assert_eq!(parts[1].to_json(), json!({ "a": 1, "b": 2 }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mutating_a_global_rebinds_locally() {
    let engine = Engine::new();
    let source = r#"
        (input seen ())
        (step add (params x) (body (seen.append x) (return seen)))
        (run (block (set a (add 1)) (set b (add 2)) (return (tuple a b seen))))
    "#;
    let outcome = run_ok(&engine, source, IndexMap::new()).await;
    assert_eq!(outcome.value.to_json(), json!([[1], [2], []]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_indexing_and_attributes() {
    assert_eq!(eval("(run (index (list 1 2 3) -1))").await, Val::Int(3));
    assert_eq!(eval(r#"(run (index "abc" 1))"#).await, Val::str("b"));
    assert_eq!(
        eval(r#"(run (block (set d (dict ("a" 1))) (return (+ (index d "a") (attr d a)))))"#).await,
        Val::Int(2)
    );

    assert_eq!(eval_err("(run (index (list 1) 5))").await.kind(), "IndexError");
    assert_eq!(eval_err(r#"(run (index (dict ("a" 1)) "b"))"#).await.kind(), "IndexError");
    assert_eq!(eval_err("(run (attr 1 real))").await.kind(), "AttributeError");
    assert_eq!(eval_err("(run (dict (1 2)))").await.kind(), "TypeError");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_undefined_name() {
    let err = eval_err("(run (block (return missing)))").await;
    assert_eq!(err.kind(), "NameError");
    assert_eq!(err.to_string(), "name 'missing' is not defined");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_calling_a_non_callable() {
    let err = eval_err("(run (block (set f 3) (return (f))))").await;
    assert_eq!(err.describe(), "TypeError: 'int' object is not callable");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_imports() {
    let value = eval(r#"(import json) (run (json.dumps (dict ("a" (list 1 2)))))"#).await;
    assert_eq!(value, Val::str(r#"{"a":[1,2]}"#));

    assert_eq!(eval("(from math import floor) (run (floor 2.7))").await, Val::Int(2));
    assert_eq!(eval("(import math as m) (run (m.ceil 2.1))").await, Val::Int(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_inputs_override_defaults() {
    let engine = Engine::new();
    let source = r#"(input name "world") (run (+ "hello " name))"#;

    let outcome = run_ok(&engine, source, IndexMap::new()).await;
    assert_eq!(outcome.value, Val::str("hello world"));

    let given = super::helpers::inputs(hashmap! { "name" => json!("vibe") });
    let outcome = run_ok(&engine, source, given).await;
    assert_eq!(outcome.value, Val::str("hello vibe"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_native_functions() {
    let engine = Engine::new().with_function("double", |args, _kwargs| match args.first() {
        Some(Val::Int(n)) => Ok(Val::Int(n * 2)),
        _ => Ok(Val::Null),
    });
    let outcome = run_ok(&engine, "(run (double 21))", IndexMap::new()).await;
    assert_eq!(outcome.value, Val::Int(42));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_validate_schema() {
    let source = r#"(run (validate (dict ("type" "integer")) value))"#;
    let engine = Engine::new();

    let ok = super::helpers::inputs(hashmap! { "value" => json!(5) });
    assert_eq!(run_ok(&engine, source, ok).await.value, Val::Int(5));

    let bad = super::helpers::inputs(hashmap! { "value" => json!("x") });
    let failure = run_err(&engine, source, bad).await;
    assert_eq!(failure.error.kind(), "ValidationError");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_validate_model() {
    let models = ModelRegistry::new().register(
        "User",
        json!({ "type": "object", "required": ["name"] }),
    );
    let engine = Engine::new().with_model_validator(Arc::new(models));

    let outcome = run_ok(
        &engine,
        r#"(run (validate (model User) (data (dict ("name" "ada")))))"#,
        IndexMap::new(),
    )
    .await;
    assert_eq!(outcome.value.to_json(), json!({ "name": "ada" }));

    let failure = run_err(
        &engine,
        r#"(run (validate (model User) (data (dict))))"#,
        IndexMap::new(),
    )
    .await;
    assert_eq!(failure.error.kind(), "ValidationError");
    assert!(failure.error.to_string().starts_with("User:"));
}
