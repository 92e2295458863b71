//! Standard library for VibeLang programs
//!
//! Builtins are identified by the [`Builtin`] enum so they can live inside
//! values and compare by identity. Native modules (`vbl`, `json`, `time`,
//! `math`) are plain [`Module`] values whose members are builtins.

pub mod builtins;
pub mod methods;
pub mod modules;
pub mod resources;

use super::errors::{Error, Result};
use super::report::Reporter;
use super::types::{Callable, Module, Val};
use indexmap::IndexMap;

/* ===================== Standard Library Function Types ===================== */

/// Standard library function identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Len,
    Str,
    Int,
    Float,
    Bool,
    List,
    Range,
    Sorted,
    Sum,
    Min,
    Max,
    Abs,
    Round,
    Print,
    Enumerate,
    Zip,
    Any,
    All,
    Not,
    Error,
    TypeOf,

    JsonDumps,
    JsonLoads,

    TimeSleep,
    TimeTime,
    TimeMonotonic,

    MathFloor,
    MathCeil,
    MathSqrt,

    VblLog,
    VblNowIso,
    VblToJson,
    VblFromJson,
    VblEnsure,
    VblSafeGet,
    VblEnv,
    VblSuppress,
    VblSpan,
}

/// Builtins visible in every scope without an import
pub const GLOBALS: &[Builtin] = &[
    Builtin::Len,
    Builtin::Str,
    Builtin::Int,
    Builtin::Float,
    Builtin::Bool,
    Builtin::List,
    Builtin::Range,
    Builtin::Sorted,
    Builtin::Sum,
    Builtin::Min,
    Builtin::Max,
    Builtin::Abs,
    Builtin::Round,
    Builtin::Print,
    Builtin::Enumerate,
    Builtin::Zip,
    Builtin::Any,
    Builtin::All,
    Builtin::Not,
    Builtin::Error,
    Builtin::TypeOf,
];

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Range => "range",
            Builtin::Sorted => "sorted",
            Builtin::Sum => "sum",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Print => "print",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Not => "not",
            Builtin::Error => "error",
            Builtin::TypeOf => "type_of",
            Builtin::JsonDumps => "json.dumps",
            Builtin::JsonLoads => "json.loads",
            Builtin::TimeSleep => "time.sleep",
            Builtin::TimeTime => "time.time",
            Builtin::TimeMonotonic => "time.monotonic",
            Builtin::MathFloor => "math.floor",
            Builtin::MathCeil => "math.ceil",
            Builtin::MathSqrt => "math.sqrt",
            Builtin::VblLog => "vbl.log",
            Builtin::VblNowIso => "vbl.now_iso",
            Builtin::VblToJson => "vbl.to_json",
            Builtin::VblFromJson => "vbl.from_json",
            Builtin::VblEnsure => "vbl.ensure",
            Builtin::VblSafeGet => "vbl.safe_get",
            Builtin::VblEnv => "vbl.env",
            Builtin::VblSuppress => "vbl.suppress",
            Builtin::VblSpan => "vbl.span",
        }
    }

    /// Member name within its module (`dumps` for `json.dumps`)
    pub fn member_name(&self) -> &'static str {
        let name = self.name();
        name.rsplit('.').next().unwrap_or(name)
    }
}

/// Global builtin with the given name
pub fn global(name: &str) -> Option<Builtin> {
    GLOBALS.iter().copied().find(|b| b.name() == name)
}

pub fn is_global(name: &str) -> bool {
    global(name).is_some()
}

/// Native module with the given name, if one exists
pub fn native_module(name: &str) -> Option<Module> {
    modules::build(name)
}

/* ===================== Stdlib Dispatcher ===================== */

/// Call a standard library function
///
/// The reporter is the per-run handle used by functions that emit events
/// (`print`, `vbl.log`) and by context resources.
pub fn call_builtin(
    builtin: Builtin,
    args: Vec<Val>,
    kwargs: IndexMap<String, Val>,
    reporter: &Reporter,
) -> Result<Val> {
    let args = Args::new(builtin.name(), args, kwargs);
    match builtin {
        Builtin::Len => builtins::len(args),
        Builtin::Str => builtins::str(args),
        Builtin::Int => builtins::int(args),
        Builtin::Float => builtins::float(args),
        Builtin::Bool => builtins::bool(args),
        Builtin::List => builtins::list(args),
        Builtin::Range => builtins::range(args),
        Builtin::Sorted => builtins::sorted(args),
        Builtin::Sum => builtins::sum(args),
        Builtin::Min => builtins::extreme(args, std::cmp::Ordering::Less),
        Builtin::Max => builtins::extreme(args, std::cmp::Ordering::Greater),
        Builtin::Abs => builtins::abs(args),
        Builtin::Round => builtins::round(args),
        Builtin::Print => builtins::print(args, reporter),
        Builtin::Enumerate => builtins::enumerate(args),
        Builtin::Zip => builtins::zip(args),
        Builtin::Any => builtins::any(args),
        Builtin::All => builtins::all(args),
        Builtin::Not => builtins::not(args),
        Builtin::Error => builtins::error(args),
        Builtin::TypeOf => builtins::type_of(args),

        Builtin::JsonDumps | Builtin::VblToJson => modules::to_json(args),
        Builtin::JsonLoads | Builtin::VblFromJson => modules::from_json(args),
        Builtin::TimeSleep => modules::sleep(args),
        Builtin::TimeTime => modules::time(args),
        Builtin::TimeMonotonic => modules::monotonic(args),
        Builtin::MathFloor => modules::floor(args),
        Builtin::MathCeil => modules::ceil(args),
        Builtin::MathSqrt => modules::sqrt(args),
        Builtin::VblLog => modules::log(args, reporter),
        Builtin::VblNowIso => modules::now_iso(args),
        Builtin::VblEnsure => modules::ensure(args),
        Builtin::VblSafeGet => modules::safe_get(args),
        Builtin::VblEnv => modules::env(args),
        Builtin::VblSuppress => resources::suppress(args),
        Builtin::VblSpan => resources::span(args),
    }
}

pub(crate) fn builtin_value(builtin: Builtin) -> Val {
    Val::Func(Callable::Builtin(builtin))
}

/* ===================== Argument Handling ===================== */

/// Positional and keyword arguments of one call, with arity checks
pub struct Args {
    name: String,
    positional: std::vec::IntoIter<Val>,
    count: usize,
    kwargs: IndexMap<String, Val>,
}

impl Args {
    pub fn new(name: impl Into<String>, args: Vec<Val>, kwargs: IndexMap<String, Val>) -> Self {
        Args {
            name: name.into(),
            count: args.len(),
            positional: args.into_iter(),
            kwargs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check the positional count lies within `min..=max`
    pub fn arity(&self, min: usize, max: usize) -> Result<()> {
        if self.count < min || self.count > max {
            let expected = if min == max {
                format!("{}", min)
            } else if max == usize::MAX {
                format!("at least {}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(Error::Type(format!(
                "{}() takes {} positional argument(s) but {} were given",
                self.name, expected, self.count
            )));
        }
        Ok(())
    }

    /// Next positional argument, or `Null` when exhausted
    pub fn next(&mut self) -> Val {
        self.positional.next().unwrap_or(Val::Null)
    }

    pub fn next_opt(&mut self) -> Option<Val> {
        self.positional.next()
    }

    /// Remaining positional arguments
    pub fn rest(&mut self) -> Vec<Val> {
        self.positional.by_ref().collect()
    }

    /// Positional argument if present, otherwise the keyword argument
    pub fn next_or_kwarg(&mut self, name: &str) -> Option<Val> {
        self.positional.next().or_else(|| self.kwargs.shift_remove(name))
    }

    pub fn kwarg(&mut self, name: &str) -> Option<Val> {
        self.kwargs.shift_remove(name)
    }

    /// Take every remaining keyword argument
    pub fn take_kwargs(&mut self) -> IndexMap<String, Val> {
        std::mem::take(&mut self.kwargs)
    }

    /// Reject keyword arguments nobody consumed
    pub fn finish(self) -> Result<()> {
        match self.kwargs.keys().next() {
            Some(key) => Err(Error::Type(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.name, key
            ))),
            None => Ok(()),
        }
    }

    pub fn type_error(&self, expected: &str, got: &Val) -> Error {
        Error::Type(format!(
            "{}() expected {}, got {}",
            self.name,
            expected,
            got.type_name()
        ))
    }

    pub fn string(&self, value: Val) -> Result<String> {
        match value {
            Val::Str(s) => Ok(s),
            other => Err(self.type_error("str", &other)),
        }
    }

    pub fn number(&self, value: &Val) -> Result<f64> {
        value.as_f64().ok_or_else(|| self.type_error("a number", value))
    }

    pub fn integer(&self, value: &Val) -> Result<i64> {
        match value {
            Val::Int(n) => Ok(*n),
            other => Err(self.type_error("int", other)),
        }
    }
}

/// Items of an iterable value: string characters, sequence items, dict keys
pub fn iterate(value: &Val) -> Result<Vec<Val>> {
    match value {
        Val::Str(s) => Ok(s.chars().map(|c| Val::Str(c.to_string())).collect()),
        Val::List(items) | Val::Tuple(items) => Ok(items.clone()),
        Val::Dict(map) => Ok(map.keys().map(|k| Val::Str(k.clone())).collect()),
        other => Err(Error::Type(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}
