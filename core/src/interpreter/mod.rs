//! VibeLang program engine
//!
//! Programs arrive either as JSON IR documents or in the parenthesized
//! surface syntax; both front-ends produce the same [`Program`]. The
//! [`Engine`] binds a program and runs its entry, routing step calls through
//! the instrumentation wrapper and recording everything in an
//! [`ExecutionReport`].

pub mod binder;
pub mod compile;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod host;
pub mod instrument;
pub mod ir;
pub mod parallel;
pub mod parser;
pub mod report;
pub mod stdlib;
pub mod types;

pub use binder::{bind, BoundProgram};
pub use compile::compile_program;
pub use engine::{Engine, RunFailure, RunOutcome};
pub use errors::{Error, Result};
pub use executor::EngineSettings;
pub use host::{
    ContextResource, HostSubstrate, JsonSchemaValidator, LogSink, MemorySink, ModelRegistry,
    ModelValidator, RawOutcome, SchemaValidator, TracingSink,
};
pub use parser::{parse_program, parse_to_ir};
pub use report::{Event, ExecutionReport, Status, StepSummary};
pub use types::{Program, Val};

use std::path::Path;

/// Read program text with the front-end matching the file extension:
/// `.vbl` is surface syntax, anything else is JSON IR
pub fn parse_source(path: &Path, text: &str) -> Result<Program> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("vbl") => parse_program(text),
        _ => ir::decode_str(text),
    }
}
