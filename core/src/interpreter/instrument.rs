//! Per-step instrumentation
//!
//! Every step call goes through [`invoke`], which drives the attempt state
//! machine:
//!
//! ```text
//! Pending -> Running -> Succeeded
//!               |  ^
//!               v  |
//!            Retrying  (while attempts remain)
//!               |
//!               v
//!            Failed
//! ```
//!
//! Timeouts and guard violations fail an attempt the same way an evaluation
//! error does, so they are retried like any other failure.

use super::errors::{Error, Result};
use super::executor::{lost_evaluation, spawn_evaluation, Evaluator};
use super::report::{Event, Status};
use super::types::{Step, Val};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a step invocation stands
#[derive(Debug, Clone, PartialEq)]
pub enum StepState {
    Pending,
    Running { attempt: u32 },
    Retrying { attempt: u32, error: Error },
    Succeeded { attempts: u32, value: Val },
    Failed { attempts: u32, error: Error },
}

impl StepState {
    /// State after an attempt finished
    fn after_attempt(attempt: u32, max_attempts: u32, outcome: Result<Val>) -> StepState {
        match outcome {
            Ok(value) => StepState::Succeeded {
                attempts: attempt,
                value,
            },
            Err(error) if attempt < max_attempts => StepState::Retrying { attempt, error },
            Err(error) => StepState::Failed {
                attempts: attempt,
                error,
            },
        }
    }
}

/// Call a step with its arguments already bound
pub fn invoke(eval: &Evaluator, step: &Arc<Step>, locals: IndexMap<String, Val>) -> Result<Val> {
    let reporter = eval.reporter();
    let slot = reporter.begin_step(&step.name);
    let started = Instant::now();
    let max_attempts = step.max_attempts();

    let mut state = StepState::Pending;
    loop {
        state = match state {
            StepState::Pending => StepState::Running { attempt: 1 },

            StepState::Running { attempt } => {
                let outcome = run_attempt(eval, step, &locals, attempt);
                StepState::after_attempt(attempt, max_attempts, outcome)
            }

            StepState::Retrying { attempt, error } => {
                tracing::debug!(
                    step = %step.name,
                    attempt,
                    error = %error.describe(),
                    "retrying step"
                );
                StepState::Running {
                    attempt: attempt + 1,
                }
            }

            StepState::Succeeded { attempts, value } => {
                reporter.finish_step(slot, started.elapsed(), attempts, None);
                return Ok(value);
            }

            StepState::Failed { attempts, error } => {
                let error = Error::RetryExhausted {
                    step: step.name.clone(),
                    attempts,
                    source: Box::new(error),
                };
                tracing::debug!(step = %step.name, attempts, "step failed");
                reporter.finish_step(slot, started.elapsed(), attempts, Some(&error));
                return Err(error);
            }
        };
    }
}

fn run_attempt(eval: &Evaluator, step: &Arc<Step>, locals: &IndexMap<String, Val>, attempt: u32) -> Result<Val> {
    let reporter = eval.reporter();
    reporter.emit(Event::new("step_start").step(&step.name).attempt(attempt));
    let started = Instant::now();

    let outcome = match step.timeout {
        Some(seconds) => run_with_timeout(eval, step, locals.clone(), seconds),
        None => eval.invoke_body(step, locals.clone()),
    }
    .and_then(|value| check_guard(step, value));

    let mut end = Event::new("step_end")
        .step(&step.name)
        .attempt(attempt)
        .duration(started.elapsed());
    end = match &outcome {
        Ok(_) => end.status(Status::Ok),
        Err(error) => end.status(Status::Error).error(error),
    };
    reporter.emit(end);
    outcome
}

/// Race one attempt against its deadline
///
/// Expiry abandons the attempt; its thread keeps running until the body
/// returns and its result is dropped.
fn run_with_timeout(eval: &Evaluator, step: &Arc<Step>, locals: IndexMap<String, Val>, seconds: f64) -> Result<Val> {
    let limit = Duration::try_from_secs_f64(seconds)
        .map_err(|e| Error::Type(format!("invalid timeout for step '{}': {}", step.name, e)))?;

    let attempt = {
        let eval = eval.clone();
        let task = step.clone();
        spawn_evaluation(&step.name, move || eval.invoke_body(&task, locals))?
    };

    match eval.handle().block_on(tokio::time::timeout(limit, attempt)) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(lost_evaluation(&step.name)),
        Err(_) => Err(Error::Timeout {
            step: step.name.clone(),
            seconds,
        }),
    }
}

fn check_guard(step: &Step, value: Val) -> Result<Val> {
    if let Val::Str(text) = &value {
        if let Some(token) = step.guard.iter().find(|token| text.contains(token.as_str())) {
            return Err(Error::GuardViolation {
                step: step.name.clone(),
                token: token.clone(),
            });
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::types::{Expr, StepBody};

    #[test]
    fn test_state_after_attempt() {
        let failure = || Err(Error::value_error("boom"));

        assert!(matches!(
            StepState::after_attempt(1, 3, failure()),
            StepState::Retrying { attempt: 1, .. }
        ));
        assert!(matches!(
            StepState::after_attempt(3, 3, failure()),
            StepState::Failed { attempts: 3, .. }
        ));
        assert_eq!(
            StepState::after_attempt(2, 3, Ok(Val::Int(1))),
            StepState::Succeeded {
                attempts: 2,
                value: Val::Int(1)
            }
        );
    }

    #[test]
    fn test_guard_only_checks_strings() {
        let mut step = Step::new("echo", StepBody::Return(Expr::name("x")));
        step.guard = vec!["OFF".to_string()];

        assert_eq!(check_guard(&step, Val::str("HELLO")).ok(), Some(Val::str("HELLO")));
        assert_eq!(
            check_guard(&step, Val::str("100% OFF")),
            Err(Error::GuardViolation {
                step: "echo".to_string(),
                token: "OFF".to_string()
            })
        );
        let list = Val::List(vec![Val::str("OFF")]);
        assert_eq!(check_guard(&step, list.clone()).ok(), Some(list));
    }
}
