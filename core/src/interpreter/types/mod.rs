//! Type definitions for the engine
//!
//! - AST nodes (Expr, Stmt)
//! - Program structure (Program, Step, Import, Run)
//! - Runtime values (Val)
//! - Control flow (Flow)

pub mod ast;
pub mod control;
pub mod program;
pub mod values;

pub use ast::{BinOp, Callee, Expr, ParallelTask, Stmt, ValidateTarget, WithItem};
pub use control::Flow;
pub use program::{Import, Program, Run, Step, StepBody};
pub use values::{Callable, ErrorValue, Module, NativeFunction, Val};
