//! Runtime value types

use crate::interpreter::host::ContextResource;
use crate::interpreter::stdlib::Builtin;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Runtime value type
#[derive(Debug, Clone)]
pub enum Val {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Val>),
    Tuple(Vec<Val>),
    /// Insertion-ordered, string-keyed mapping
    Dict(IndexMap<String, Val>),
    Func(Callable),
    Module(Arc<Module>),
    Resource(Arc<dyn ContextResource>),
    /// Error value with kind and message
    Error(ErrorValue),
}

/// Error value carried by `raise` and produced by `error(kind, message)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorValue {
    pub kind: String,
    pub message: String,
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/* ===================== Callables ===================== */

#[derive(Debug, Clone)]
pub enum Callable {
    /// Handle to a bound step; calls go through the instrumentation wrapper
    Step(String),
    Builtin(Builtin),
    /// Method looked up on a value, e.g. `text.strip`
    Method { receiver: Box<Val>, name: String },
    /// Function registered by the embedding application
    Native(NativeFunction),
    /// Member of a module resolved by the host substrate
    Host { module: String, member: String },
}

impl Callable {
    pub fn display_name(&self) -> String {
        match self {
            Callable::Step(name) => name.clone(),
            Callable::Builtin(b) => b.name().to_string(),
            Callable::Method { receiver, name } => format!("{}.{}", receiver.type_name(), name),
            Callable::Native(f) => f.name.clone(),
            Callable::Host { module, member } => format!("{}.{}", module, member),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Step(a), Callable::Step(b)) => a == b,
            (Callable::Builtin(a), Callable::Builtin(b)) => a == b,
            (
                Callable::Method {
                    receiver: ra,
                    name: na,
                },
                Callable::Method {
                    receiver: rb,
                    name: nb,
                },
            ) => na == nb && ra == rb,
            (Callable::Native(a), Callable::Native(b)) => Arc::ptr_eq(&a.func, &b.func),
            (
                Callable::Host {
                    module: ma,
                    member: a,
                },
                Callable::Host {
                    module: mb,
                    member: b,
                },
            ) => ma == mb && a == b,
            _ => false,
        }
    }
}

pub type NativeFn =
    dyn Fn(Vec<Val>, IndexMap<String, Val>) -> crate::interpreter::Result<Val> + Send + Sync;

#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Val>, IndexMap<String, Val>) -> crate::interpreter::Result<Val>
            + Send
            + Sync
            + 'static,
    {
        NativeFunction {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Named collection of members bound by an import
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub members: IndexMap<String, Val>,
}

/* ===================== Behaviour ===================== */

impl Val {
    pub fn str(s: impl Into<String>) -> Self {
        Val::Str(s.into())
    }

    /// Python-style truthiness: null, false, zero and empty containers are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Int(n) => *n != 0,
            Val::Float(n) => *n != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::List(items) | Val::Tuple(items) => !items.is_empty(),
            Val::Dict(map) => !map.is_empty(),
            Val::Func(_) | Val::Module(_) | Val::Resource(_) | Val::Error(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::Str(_) => "str",
            Val::List(_) => "list",
            Val::Tuple(_) => "tuple",
            Val::Dict(_) => "dict",
            Val::Func(_) => "function",
            Val::Module(_) => "module",
            Val::Resource(_) => "resource",
            Val::Error(_) => "error",
        }
    }

    /// Numeric view used by arithmetic; booleans are not numbers here
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Int(n) => Some(*n as f64),
            Val::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn from_json(value: &JsonValue) -> Val {
        match value {
            JsonValue::Null => Val::Null,
            JsonValue::Bool(b) => Val::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Val::Int(i),
                None => Val::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Val::Str(s.clone()),
            JsonValue::Array(items) => Val::List(items.iter().map(Val::from_json).collect()),
            JsonValue::Object(map) => Val::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), Val::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON view of a value; non-data values render as descriptive strings
    pub fn to_json(&self) -> JsonValue {
        match self {
            Val::Null => JsonValue::Null,
            Val::Bool(b) => JsonValue::Bool(*b),
            Val::Int(n) => JsonValue::from(*n),
            Val::Float(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Val::Str(s) => JsonValue::String(s.clone()),
            Val::List(items) | Val::Tuple(items) => {
                JsonValue::Array(items.iter().map(Val::to_json).collect())
            }
            Val::Dict(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Val::Func(c) => JsonValue::String(format!("<function {}>", c.display_name())),
            Val::Module(m) => JsonValue::String(format!("<module {}>", m.name)),
            Val::Resource(r) => JsonValue::String(format!("<resource {}>", r.name())),
            Val::Error(e) => serde_json::json!({ "kind": e.kind, "message": e.message }),
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Int(_) | Val::Float(_), Val::Int(_) | Val::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::List(a), Val::List(b)) | (Val::Tuple(a), Val::Tuple(b)) => a == b,
            (Val::Dict(a), Val::Dict(b)) => a == b,
            (Val::Func(a), Val::Func(b)) => a == b,
            (Val::Module(a), Val::Module(b)) => a.name == b.name,
            (Val::Resource(a), Val::Resource(b)) => Arc::ptr_eq(a, b),
            (Val::Error(a), Val::Error(b)) => a == b,
            _ => false,
        }
    }
}

/// Strings print raw; everything else prints as compact JSON
impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Str(s) => f.write_str(s),
            Val::Error(e) => write!(f, "{}", e),
            Val::Func(c) => write!(f, "<function {}>", c.display_name()),
            Val::Module(m) => write!(f, "<module {}>", m.name),
            Val::Resource(r) => write!(f, "<resource {}>", r.name()),
            other => f.write_str(&other.to_json().to_string()),
        }
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Str(s.to_string())
    }
}

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Str(s)
    }
}

impl From<i64> for Val {
    fn from(n: i64) -> Self {
        Val::Int(n)
    }
}

impl From<f64> for Val {
    fn from(n: f64) -> Self {
        Val::Float(n)
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}
