//! Execution report accumulation
//!
//! One [`Reporter`] exists per run. It is cloned into every evaluator,
//! instrumentation call and parallel task of that run, collects events and
//! step summaries in causal order, and forwards each event to the log sink.

use super::errors::{Error, Result};
use super::host::LogSink;
use super::ir;
use super::types::{Program, Val};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/* ===================== Records ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Ok,
    Error,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Running => "running",
            Status::Ok => "ok",
            Status::Error => "error",
            Status::Cancelled => "cancelled",
        }
    }
}

/// Structured event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Event {
            kind: kind.into(),
            ts: Utc::now(),
            step: None,
            attempt: None,
            status: None,
            duration_ms: None,
            error: None,
            fields: Map::new(),
        }
    }

    pub fn step(mut self, name: impl Into<String>) -> Self {
        self.step = Some(name.into());
        self
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = Some(millis(elapsed));
        self
    }

    pub fn error(mut self, error: &Error) -> Self {
        self.error = Some(error.describe());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one step invocation (all of its attempts)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub name: String,
    pub status: Status,
    pub duration_ms: f64,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Serializable record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub run_id: Uuid,
    pub meta: Map<String, JsonValue>,
    pub program_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: f64,
    pub status: Status,
    pub error: Option<String>,
    pub steps: Vec<StepSummary>,
    pub events: Vec<Event>,
    pub result: JsonValue,
}

impl ExecutionReport {
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    /// Summaries for every invocation of a step, in invocation order
    pub fn step_summaries(&self, name: &str) -> Vec<&StepSummary> {
        self.steps.iter().filter(|s| s.name == name).collect()
    }

    pub fn events_of(&self, kind: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }
}

fn millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1_000_000.0).round() / 1000.0
}

/// SHA-256 of the canonical JSON IR
pub fn program_hash(program: &Program) -> String {
    let canonical = ir::encode(program).to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

/* ===================== Reporter ===================== */

struct ReportState {
    run_id: Uuid,
    meta: Map<String, JsonValue>,
    program_hash: String,
    started_at: DateTime<Utc>,
    started: Instant,
    events: Vec<Event>,
    steps: Vec<StepSummary>,
}

/// Per-run handle threaded through evaluation
#[derive(Clone)]
pub struct Reporter {
    state: Arc<Mutex<ReportState>>,
    sink: Arc<dyn LogSink>,
}

/// Index of a reserved step summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSlot(usize);

impl Reporter {
    pub fn new(program: &Program, sink: Arc<dyn LogSink>) -> Self {
        let state = ReportState {
            run_id: Uuid::new_v4(),
            meta: program
                .meta
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            program_hash: program_hash(program),
            started_at: Utc::now(),
            started: Instant::now(),
            events: Vec::new(),
            steps: Vec::new(),
        };
        Reporter {
            state: Arc::new(Mutex::new(state)),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReportState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn run_id(&self) -> Uuid {
        self.lock().run_id
    }

    pub fn emit(&self, event: Event) {
        self.sink.record(&event);
        self.lock().events.push(event);
    }

    /// Reserve a summary at invocation start so summaries keep causal order
    pub fn begin_step(&self, name: &str) -> StepSlot {
        let mut state = self.lock();
        state.steps.push(StepSummary {
            name: name.to_string(),
            status: Status::Running,
            duration_ms: 0.0,
            attempts: 0,
            error: None,
        });
        StepSlot(state.steps.len() - 1)
    }

    pub fn finish_step(&self, slot: StepSlot, elapsed: Duration, attempts: u32, error: Option<&Error>) {
        let mut state = self.lock();
        if let Some(summary) = state.steps.get_mut(slot.0) {
            summary.status = if error.is_some() { Status::Error } else { Status::Ok };
            summary.duration_ms = millis(elapsed);
            summary.attempts = attempts;
            summary.error = error.map(Error::describe);
        }
    }

    /// Report as it stands, without a terminal status
    pub fn snapshot(&self) -> ExecutionReport {
        let state = self.lock();
        ExecutionReport {
            run_id: state.run_id,
            meta: state.meta.clone(),
            program_hash: state.program_hash.clone(),
            started_at: state.started_at,
            finished_at: None,
            duration_ms: millis(state.started.elapsed()),
            status: Status::Running,
            error: None,
            steps: state.steps.clone(),
            events: state.events.clone(),
            result: JsonValue::Null,
        }
    }

    /// Record the run outcome and produce the final report
    pub fn finish(&self, outcome: &Result<Val>) -> ExecutionReport {
        let mut report = self.snapshot();
        report.finished_at = Some(Utc::now());
        match outcome {
            Ok(value) => {
                report.status = Status::Ok;
                report.result = value.to_json();
            }
            Err(error) => {
                report.status = Status::Error;
                report.error = Some(error.describe());
            }
        }
        report
    }
}
