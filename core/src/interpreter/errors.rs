//! Error taxonomy for loading, binding and evaluating programs
//!
//! Every failure the engine can surface is a variant of [`Error`]. Errors are
//! `Clone` so they can be recorded in reports, captured by `with` blocks and
//! re-raised later in the same scope.

use super::types::values::ErrorValue;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("malformed IR: {}", .0.join("; "))]
    MalformedIr(Vec<String>),

    #[error("{message} at line {line}, column {column}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{0}")]
    Bind(String),

    #[error("{0}")]
    Name(String),

    #[error("{0}")]
    Attribute(String),

    #[error("{0}")]
    Index(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Arithmetic(String),

    #[error("{0}")]
    Recursion(String),

    #[error("{0}")]
    Validation(String),

    #[error("{}", .0.as_deref().unwrap_or("assertion failed"))]
    Assertion(Option<String>),

    #[error("step '{step}' produced forbidden token '{token}'")]
    GuardViolation { step: String, token: String },

    #[error("step '{step}' timed out after {seconds}s")]
    Timeout { step: String, seconds: f64 },

    #[error("step '{step}' failed after {attempts} attempt(s): {}", .source.describe())]
    RetryExhausted {
        step: String,
        attempts: u32,
        source: Box<Error>,
    },

    #[error("parallel task '{task}' failed: {}", .source.describe())]
    ParallelTaskFailed { task: String, source: Box<Error> },

    #[error("{0}")]
    RawExecution(String),

    /// User-raised error value (`raise`, `vbl.ensure`, `error(...)`)
    #[error("{message}")]
    Raised { kind: String, message: String },

    #[error("{0}")]
    Runtime(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Stable kind name used in events, reports and `vbl.suppress`
    pub fn kind(&self) -> &str {
        match self {
            Error::MalformedIr(_) => "MalformedIR",
            Error::Parse { .. } => "ParseError",
            Error::Bind(_) => "BindError",
            Error::Name(_) => "NameError",
            Error::Attribute(_) => "AttributeError",
            Error::Index(_) => "IndexError",
            Error::Type(_) => "TypeError",
            Error::Arithmetic(_) => "ArithmeticError",
            Error::Recursion(_) => "RecursionError",
            Error::Validation(_) => "ValidationError",
            Error::Assertion(_) => "AssertionError",
            Error::GuardViolation { .. } => "GuardViolation",
            Error::Timeout { .. } => "TimeoutError",
            Error::RetryExhausted { .. } => "RetryExhausted",
            Error::ParallelTaskFailed { .. } => "ParallelTaskFailed",
            Error::RawExecution(_) => "RawExecutionError",
            Error::Raised { kind, .. } => kind,
            Error::Runtime(_) => "RuntimeError",
            Error::Internal(_) => "InternalError",
        }
    }

    /// `"Kind: message"`, the form recorded in reports
    pub fn describe(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    /// Error wrapped by a step or parallel task, if any
    pub fn inner(&self) -> Option<&Error> {
        match self {
            Error::RetryExhausted { source, .. } | Error::ParallelTaskFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Innermost error after unwrapping step and task wrappers
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Some(inner) = current.inner() {
            current = inner;
        }
        current
    }

    /// True when this error or any wrapped error has the given kind
    pub fn matches_kind(&self, kind: &str) -> bool {
        if kind == "Exception" || kind == "*" {
            return true;
        }
        let mut current = Some(self);
        while let Some(err) = current {
            if err.kind() == kind {
                return true;
            }
            current = err.inner();
        }
        false
    }

    /// Structural failures exit with 2, evaluation failures with 1
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MalformedIr(_) | Error::Parse { .. } | Error::Bind(_) => 2,
            _ => 1,
        }
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Error::Raised {
            kind: "ValueError".to_string(),
            message: message.into(),
        }
    }

    pub fn to_value(&self) -> ErrorValue {
        ErrorValue {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<ErrorValue> for Error {
    fn from(value: ErrorValue) -> Self {
        Error::Raised {
            kind: value.kind,
            message: value.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_uses_kind_prefix() {
        let err = Error::Name("name 'x' is not defined".to_string());
        assert_eq!(err.describe(), "NameError: name 'x' is not defined");
    }

    #[test]
    fn test_root_cause_unwraps_step_and_task() {
        let err = Error::ParallelTaskFailed {
            task: "a".to_string(),
            source: Box::new(Error::RetryExhausted {
                step: "fetch".to_string(),
                attempts: 2,
                source: Box::new(Error::Type("bad".to_string())),
            }),
        };

        assert_eq!(err.root_cause().kind(), "TypeError");
        assert!(err.matches_kind("RetryExhausted"));
        assert!(err.matches_kind("TypeError"));
        assert!(!err.matches_kind("NameError"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::Bind("x".to_string()).exit_code(), 2);
        assert_eq!(Error::MalformedIr(vec![]).exit_code(), 2);
        assert_eq!(Error::Runtime("x".to_string()).exit_code(), 1);
    }
}
