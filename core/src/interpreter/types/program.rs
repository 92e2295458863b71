//! Program, step and import definitions

use super::ast::{Expr, Stmt};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

/// A complete program: immutable once validated
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub meta: IndexMap<String, JsonValue>,
    pub imports: Vec<Import>,
    pub inputs: IndexMap<String, JsonValue>,
    pub steps: Vec<Step>,
    pub run: Run,
}

impl Program {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Import {
    /// `import module [as alias]`
    Module {
        module: String,
        alias: Option<String>,
    },
    /// `from module import names...`
    From { module: String, names: Vec<String> },
}

impl Import {
    pub fn module(&self) -> &str {
        match self {
            Import::Module { module, .. } | Import::From { module, .. } => module,
        }
    }
}

/// A named, parameterized, instrumented unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    pub params: Vec<String>,
    pub retry: u32,
    /// Wall-clock limit per attempt, in seconds
    pub timeout: Option<f64>,
    /// Substrings forbidden in string results
    pub guard: Vec<String>,
    /// Informational tag, never checked
    pub produces: Option<String>,
    pub body: StepBody,
}

impl Step {
    pub fn new(name: impl Into<String>, body: StepBody) -> Self {
        Step {
            name: name.into(),
            params: Vec::new(),
            retry: 0,
            timeout: None,
            guard: Vec::new(),
            produces: None,
            body,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.saturating_add(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepBody {
    Block(Vec<Stmt>),
    /// Raw source lines handed to the host substrate
    Raw(Vec<String>),
    /// Sugar for a body that returns a single expression
    Return(Expr),
}

/// The program entry
#[derive(Debug, Clone, PartialEq)]
pub enum Run {
    Expr(Expr),
    Block(Vec<Stmt>),
    Raw(Vec<String>),
}
