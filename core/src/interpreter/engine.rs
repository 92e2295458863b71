//! Engine facade
//!
//! [`Engine`] owns the settings and collaborators shared by every run and
//! exposes binding and execution. Each call to [`Engine::run`] gets its own
//! reporter, environment and evaluation thread; runs share nothing mutable.

use super::binder::{self, BoundProgram};
use super::errors::{Error, Result};
use super::executor::{lost_evaluation, spawn_evaluation, EngineSettings, Evaluator, RunContext};
use super::host::{HostSubstrate, LogSink, ModelValidator, SchemaValidator, Services};
use super::report::{Event, ExecutionReport, Reporter, Status};
use super::types::{NativeFunction, Program, Val};
use crate::config::Config;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;

/// Successful run: the raw result plus the finished report
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub value: Val,
    pub report: ExecutionReport,
}

/// Failed run: the error is also recorded in the report
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .error.describe())]
pub struct RunFailure {
    pub error: Error,
    pub report: ExecutionReport,
}

#[derive(Clone, Default)]
pub struct Engine {
    settings: EngineSettings,
    services: Services,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new().with_settings(EngineSettings {
            parallel_workers: config.engine.parallel_workers,
            max_call_depth: config.engine.max_call_depth,
        })
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.services.sink = sink;
        self
    }

    pub fn with_schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.services.schemas = validator;
        self
    }

    pub fn with_model_validator(mut self, validator: Arc<dyn ModelValidator>) -> Self {
        self.services.models = validator;
        self
    }

    /// Install a host substrate; raw-source nodes are rejected without one
    pub fn with_host(mut self, host: Arc<dyn HostSubstrate>) -> Self {
        self.services.host = Some(host);
        self
    }

    /// Register a native function callable by name from every program
    pub fn with_function<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Val>, IndexMap<String, Val>) -> Result<Val> + Send + Sync + 'static,
    {
        self.services.register_function(NativeFunction::new(name, func));
        self
    }

    pub fn with_global(mut self, name: impl Into<String>, value: Val) -> Self {
        self.services.globals.insert(name.into(), value);
        self
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Validate a program and resolve its names without running it
    pub fn bind(&self, program: &Program) -> Result<BoundProgram> {
        binder::bind(program, &self.services)
    }

    /// Run a program's entry with the given inputs
    ///
    /// Inputs override the program's declared defaults; names the program does
    /// not declare are bound as extra globals.
    pub async fn run(
        &self,
        program: &Program,
        inputs: IndexMap<String, JsonValue>,
    ) -> std::result::Result<RunOutcome, RunFailure> {
        let reporter = Reporter::new(program, self.services.sink.clone());
        let run_id = reporter.run_id();
        let started = Instant::now();

        tracing::info!(%run_id, steps = program.steps.len(), "run started");
        reporter.emit(Event::new("run_start").field("run_id", run_id.to_string()));

        let outcome = self.execute(program, inputs, &reporter).await;

        let end = Event::new("run_end").duration(started.elapsed());
        match &outcome {
            Ok(_) => {
                reporter.emit(end.status(Status::Ok));
                tracing::info!(%run_id, elapsed_ms = started.elapsed().as_millis() as u64, "run finished");
            }
            Err(error) => {
                reporter.emit(end.status(Status::Error).error(error));
                tracing::warn!(%run_id, error = %error.describe(), "run failed");
            }
        }

        let report = reporter.finish(&outcome);
        match outcome {
            Ok(value) => Ok(RunOutcome { value, report }),
            Err(error) => Err(RunFailure { error, report }),
        }
    }

    /// [`Engine::run`] on a runtime of its own
    pub fn run_blocking(
        &self,
        program: &Program,
        inputs: IndexMap<String, JsonValue>,
    ) -> std::result::Result<RunOutcome, RunFailure> {
        match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(runtime) => runtime.block_on(self.run(program, inputs)),
            Err(e) => {
                let error = Error::Internal(format!("failed to start runtime: {}", e));
                let reporter = Reporter::new(program, self.services.sink.clone());
                let report = reporter.finish(&Err(error.clone()));
                Err(RunFailure { error, report })
            }
        }
    }

    async fn execute(
        &self,
        program: &Program,
        inputs: IndexMap<String, JsonValue>,
        reporter: &Reporter,
    ) -> Result<Val> {
        let bound = self.bind(program)?;

        let mut globals: IndexMap<String, Val> = program
            .inputs
            .iter()
            .map(|(name, value)| (name.clone(), Val::from_json(value)))
            .collect();
        for (name, value) in inputs {
            globals.insert(name, Val::from_json(&value));
        }
        globals.extend(self.services.globals.clone());
        globals.extend(bound.globals.clone());

        let ctx = Arc::new(RunContext {
            program: Arc::new(bound),
            globals,
            reporter: reporter.clone(),
            services: self.services.clone(),
            handle: Handle::current(),
            settings: self.settings,
        });

        let result = spawn_evaluation("run", move || Evaluator::new(ctx).run_entry())?;
        result.await.map_err(|_| lost_evaluation("run"))?
    }
}
