//! Test helpers for executor tests
//!
//! Common utilities for parsing programs and running them through an engine
//! that records events in memory.

use crate::interpreter::engine::{Engine, RunFailure, RunOutcome};
use crate::interpreter::host::MemorySink;
use crate::interpreter::parser::parse_program;
use crate::interpreter::report::{ExecutionReport, Status};
use crate::interpreter::types::{Program, Val};
use crate::interpreter::{Error, Result};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Parse surface source, panicking on syntax errors
pub fn program(source: &str) -> Program {
    parse_program(source).expect("Parse program failed")
}

/// Engine whose events land in the returned sink
pub fn recording_engine() -> (Engine, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    (Engine::new().with_sink(sink.clone()), sink)
}

pub fn inputs(values: HashMap<&str, JsonValue>) -> IndexMap<String, JsonValue> {
    values.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub async fn run_ok(engine: &Engine, source: &str, inputs: IndexMap<String, JsonValue>) -> RunOutcome {
    match engine.run(&program(source), inputs).await {
        Ok(outcome) => outcome,
        Err(failure) => unreachable!("Expected success, got {}", failure),
    }
}

pub async fn run_err(engine: &Engine, source: &str, inputs: IndexMap<String, JsonValue>) -> RunFailure {
    match engine.run(&program(source), inputs).await {
        Ok(outcome) => unreachable!("Expected failure, got {:?}", outcome.value),
        Err(failure) => failure,
    }
}

/// Run with the default engine and no inputs, returning the value
pub async fn eval(source: &str) -> Val {
    run_ok(&Engine::new(), source, IndexMap::new()).await.value
}

/// Run with the default engine and no inputs, returning the error
pub async fn eval_err(source: &str) -> Error {
    run_err(&Engine::new(), source, IndexMap::new()).await.error
}

/// Native function failing with ValueError on its first `failures` calls
pub fn flaky(
    failures: usize,
) -> (
    impl Fn(Vec<Val>, IndexMap<String, Val>) -> Result<Val> + Send + Sync + 'static,
    Arc<AtomicUsize>,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let func = move |_args: Vec<Val>, _kwargs: IndexMap<String, Val>| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            Err(Error::value_error(format!("call {} failed", call)))
        } else {
            Ok(Val::str("ok"))
        }
    };
    (func, calls)
}

/// Statuses of every step_end event recorded for a step
pub fn attempt_statuses(report: &ExecutionReport, step: &str) -> Vec<Status> {
    report
        .events_of("step_end")
        .into_iter()
        .filter(|e| e.step.as_deref() == Some(step))
        .filter_map(|e| e.status)
        .collect()
}
