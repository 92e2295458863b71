//! Tree-walking evaluator
//!
//! One [`RunContext`] exists per run and is shared by every [`Evaluator`]
//! of that run: the main entry, nested step calls, timed attempts and
//! parallel tasks. Evaluation itself is synchronous; each evaluation runs on
//! its own thread (see [`spawn_evaluation`]) so it can block on timers and
//! on the parallel pool through the runtime handle.

pub mod expressions;
pub mod operators;
pub mod statements;

#[cfg(test)]
mod tests;

use super::binder::BoundProgram;
use super::errors::{Error, Result};
use super::host::{HostSubstrate, RawOutcome, Services};
use super::report::Reporter;
use super::stdlib;
use super::types::{Callable, Flow, Run, Step, StepBody, Val};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Stack reserved for each evaluation thread
const EVAL_STACK_SIZE: usize = 32 * 1024 * 1024;

/* ===================== Settings ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Size of the bounded pool used by `parallel`
    pub parallel_workers: usize,
    /// Maximum nesting of step calls
    pub max_call_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            parallel_workers: 4,
            max_call_depth: 64,
        }
    }
}

/* ===================== Run Context ===================== */

/// Everything shared by the evaluators of one run
pub struct RunContext {
    pub program: Arc<BoundProgram>,
    /// Inputs, registered globals, `vbl` and import bindings
    pub globals: IndexMap<String, Val>,
    pub reporter: Reporter,
    pub services: Services,
    pub handle: Handle,
    pub settings: EngineSettings,
}

/// Local scope of a step body or the run block
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub locals: IndexMap<String, Val>,
    /// Error most recently suppressed by a `with` block, for bare `raise`
    pub last_suppressed: Option<Error>,
}

impl Frame {
    pub fn with_locals(locals: IndexMap<String, Val>) -> Self {
        Frame {
            locals,
            last_suppressed: None,
        }
    }
}

#[derive(Clone)]
pub struct Evaluator {
    ctx: Arc<RunContext>,
    depth: usize,
}

impl Evaluator {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Evaluator { ctx, depth: 0 }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn reporter(&self) -> &Reporter {
        &self.ctx.reporter
    }

    pub fn handle(&self) -> &Handle {
        &self.ctx.handle
    }

    /// Evaluator for the body of a step called from this one
    pub fn nested(&self, step: &str) -> Result<Evaluator> {
        let depth = self.depth + 1;
        if depth > self.ctx.settings.max_call_depth {
            return Err(Error::Recursion(format!(
                "maximum call depth of {} exceeded calling step '{}'",
                self.ctx.settings.max_call_depth, step
            )));
        }
        Ok(Evaluator {
            ctx: self.ctx.clone(),
            depth,
        })
    }

    /// Nearest binding of a name: locals, globals, then builtins
    pub fn lookup(&self, frame: &Frame, name: &str) -> Result<Val> {
        if let Some(value) = frame.locals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.ctx.globals.get(name) {
            return Ok(value.clone());
        }
        if self.ctx.program.steps.contains_key(name) {
            return Ok(Val::Func(Callable::Step(name.to_string())));
        }
        if let Some(builtin) = stdlib::global(name) {
            return Ok(stdlib::builtin_value(builtin));
        }
        Err(Error::Name(format!("name '{}' is not defined", name)))
    }

    /* ===================== Entry Points ===================== */

    /// Evaluate the program's `run` entry
    pub fn run_entry(&self) -> Result<Val> {
        let mut frame = Frame::default();
        match &self.ctx.program.program.run {
            Run::Expr(expr) => self.eval(&mut frame, expr),
            Run::Block(body) => match self.exec_block(&mut frame, body)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Val::Null),
            },
            Run::Raw(lines) => self.exec_raw(&mut frame, lines).map(|returned| returned.unwrap_or(Val::Null)),
        }
    }

    /// Evaluate one attempt of a step body with its parameters bound
    pub fn invoke_body(&self, step: &Step, locals: IndexMap<String, Val>) -> Result<Val> {
        let mut frame = Frame::with_locals(locals);
        match &step.body {
            StepBody::Return(expr) => self.eval(&mut frame, expr),
            StepBody::Block(body) => match self.exec_block(&mut frame, body)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Val::Null),
            },
            StepBody::Raw(lines) => self.exec_raw(&mut frame, lines).map(|returned| returned.unwrap_or(Val::Null)),
        }
    }

    /* ===================== Host Substrate ===================== */

    /// JSON snapshot of every data binding visible from the frame
    pub fn bindings_snapshot(&self, frame: &Frame) -> Map<String, JsonValue> {
        let visible = self.ctx.globals.iter().chain(frame.locals.iter());
        let mut out = Map::new();
        for (name, value) in visible {
            if matches!(value, Val::Func(_) | Val::Module(_) | Val::Resource(_)) {
                continue;
            }
            out.insert(name.clone(), value.to_json());
        }
        out
    }

    fn host(&self) -> Result<&Arc<dyn HostSubstrate>> {
        self.ctx
            .services
            .host
            .as_ref()
            .ok_or_else(|| Error::RawExecution("no host substrate installed".to_string()))
    }

    pub fn eval_raw(&self, frame: &Frame, source: &str) -> Result<Val> {
        let bindings = self.bindings_snapshot(frame);
        self.host()?
            .eval(source, &bindings)
            .map(|v| Val::from_json(&v))
            .map_err(Error::RawExecution)
    }

    /// Run raw statement lines; new bindings land in the frame
    pub fn exec_raw(&self, frame: &mut Frame, lines: &[String]) -> Result<Option<Val>> {
        let bindings = self.bindings_snapshot(frame);
        let RawOutcome { bindings, returned } = self
            .host()?
            .exec(lines, &bindings)
            .map_err(Error::RawExecution)?;

        for (name, value) in bindings {
            frame.locals.insert(name, Val::from_json(&value));
        }
        Ok(returned.map(|v| Val::from_json(&v)))
    }
}

/* ===================== Evaluation Threads ===================== */

/// Run `f` on a dedicated evaluation thread, delivering its result through
/// a oneshot channel
///
/// The receiver can be awaited (and raced against a deadline) without tying
/// up a runtime worker.
pub(crate) fn spawn_evaluation<R, F>(label: &str, f: F) -> Result<oneshot::Receiver<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name(format!("vibelang-{}", label))
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || {
            // receiver may be gone after a timeout
            let _ = tx.send(f());
        })
        .map_err(|e| Error::Internal(format!("failed to spawn evaluation thread: {}", e)))?;
    Ok(rx)
}

/// Error for an evaluation thread that ended without reporting back
pub(crate) fn lost_evaluation(label: &str) -> Error {
    Error::Internal(format!("evaluation of '{}' ended without a result", label))
}
