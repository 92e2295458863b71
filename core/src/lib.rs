pub mod cli;
pub mod config;
pub mod interpreter;

// Re-export the engine surface
pub use interpreter::{
    compile_program, parse_program, parse_source, Engine, Error, ExecutionReport, Program,
    RunFailure, RunOutcome, Val,
};
