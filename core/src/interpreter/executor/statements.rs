//! Statement execution
//!
//! Blocks run statement by statement and report how control left them as a
//! [`Flow`]. Errors propagate as `Err` and unwind through `with` blocks,
//! which give each entered resource a chance to release and suppress.

use super::{Evaluator, Frame};
use crate::interpreter::errors::{Error, Result};
use crate::interpreter::host::ContextResource;
use crate::interpreter::stdlib;
use crate::interpreter::types::{Expr, Flow, Stmt, Val, WithItem};
use std::sync::Arc;

impl Evaluator {
    pub fn exec_block(&self, frame: &mut Frame, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            match self.exec_stmt(frame, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    pub fn exec_stmt(&self, frame: &mut Frame, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Set { name, value } => {
                let value = self.eval(frame, value)?;
                frame.locals.insert(name.clone(), value);
                Ok(Flow::Normal)
            }

            Stmt::Expr(expr) => {
                self.eval(frame, expr)?;
                Ok(Flow::Normal)
            }

            Stmt::Return(expr) => Ok(Flow::Return(self.eval(frame, expr)?)),

            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(frame, cond)?.is_truthy() {
                    self.exec_block(frame, then)
                } else {
                    self.exec_block(frame, otherwise)
                }
            }

            Stmt::For { var, iter, body } => {
                let items = stdlib::iterate(&self.eval(frame, iter)?)?;
                for item in items {
                    frame.locals.insert(var.clone(), item);
                    match self.exec_block(frame, body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal)
            }

            Stmt::While {
                cond,
                body,
                otherwise,
            } => {
                while self.eval(frame, cond)?.is_truthy() {
                    match self.exec_block(frame, body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Normal | Flow::Continue => {}
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                self.exec_block(frame, otherwise)
            }

            Stmt::Break => Ok(Flow::Break),

            Stmt::Continue => Ok(Flow::Continue),

            Stmt::With { items, body } => self.exec_with(frame, items, body),

            Stmt::Assert { cond, msg } => {
                if self.eval(frame, cond)?.is_truthy() {
                    return Ok(Flow::Normal);
                }
                let message = match msg {
                    Some(msg) => Some(self.eval(frame, msg)?.to_string()),
                    None => None,
                };
                Err(Error::Assertion(message))
            }

            Stmt::Raise(value) => Err(self.raised(frame, value.as_ref())?),

            Stmt::Raw(lines) => Ok(match self.exec_raw(frame, lines)? {
                Some(value) => Flow::Return(value),
                None => Flow::Normal,
            }),
        }
    }

    /// Error produced by a `raise` statement
    fn raised(&self, frame: &mut Frame, value: Option<&Expr>) -> Result<Error> {
        let Some(value) = value else {
            return Ok(frame
                .last_suppressed
                .clone()
                .unwrap_or_else(|| Error::Runtime("no active error to re-raise".to_string())));
        };
        Ok(match self.eval(frame, value)? {
            Val::Error(err) => Error::from(err),
            Val::Str(message) => Error::Runtime(message),
            other => Error::Type(format!(
                "exceptions must be error values or strings, not {}",
                other.type_name()
            )),
        })
    }

    /* ===================== With ===================== */

    fn exec_with(&self, frame: &mut Frame, items: &[WithItem], body: &[Stmt]) -> Result<Flow> {
        let mut entered = Vec::with_capacity(items.len());
        let mut outcome = self.enter_all(frame, items, &mut entered);
        if outcome.is_ok() {
            outcome = self.exec_block(frame, body);
        }

        // release in reverse; a suppressing exit hides the error from outer ones
        let mut pending = outcome.as_ref().err().cloned();
        for resource in entered.iter().rev() {
            match resource.exit(self.reporter(), pending.as_ref()) {
                Ok(true) if pending.is_some() => {
                    tracing::debug!(resource = resource.name(), "error suppressed");
                    frame.last_suppressed = pending.take();
                }
                Ok(_) => {}
                Err(e) => pending = Some(e),
            }
        }

        match (pending, outcome) {
            (Some(error), _) => Err(error),
            (None, Ok(flow)) => Ok(flow),
            (None, Err(_)) => Ok(Flow::Normal),
        }
    }

    fn enter_all(
        &self,
        frame: &mut Frame,
        items: &[WithItem],
        entered: &mut Vec<Arc<dyn ContextResource>>,
    ) -> Result<Flow> {
        for item in items {
            let resource = match self.eval(frame, &item.context)? {
                Val::Resource(resource) => resource,
                other => {
                    return Err(Error::Type(format!(
                        "'{}' object does not support the context protocol",
                        other.type_name()
                    )))
                }
            };
            let value = resource.enter(self.reporter())?;
            entered.push(resource.clone());
            if let Some(alias) = &item.alias {
                let bound = match value {
                    Val::Null => Val::Resource(resource),
                    value => value,
                };
                frame.locals.insert(alias.clone(), bound);
            }
        }
        Ok(Flow::Normal)
    }
}
