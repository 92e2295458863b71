//! Control flow produced by statement execution

use super::values::Val;

/* ===================== Control Flow ===================== */

/// Outcome of executing a statement or block
///
/// Errors travel separately through `Result`; this only carries structured
/// unwinding. A `Break`/`Continue` unwinds to the nearest loop, `Return` to
/// the enclosing step or run.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Val),
}

impl Flow {
    pub fn is_normal(&self) -> bool {
        matches!(self, Flow::Normal)
    }
}
