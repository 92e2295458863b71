//! Native modules: `vbl`, `json`, `time` and `math`

use super::{builtin_value, Args, Builtin};
use crate::interpreter::errors::{Error, Result};
use crate::interpreter::report::{Event, Reporter};
use crate::interpreter::types::{Module, Val};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

pub const NATIVE_MODULES: &[&str] = &["vbl", "json", "time", "math"];

/// Build the module value for a native module name
pub fn build(name: &str) -> Option<Module> {
    let functions: &[Builtin] = match name {
        "json" => &[Builtin::JsonDumps, Builtin::JsonLoads],
        "time" => &[Builtin::TimeSleep, Builtin::TimeTime, Builtin::TimeMonotonic],
        "math" => &[Builtin::MathFloor, Builtin::MathCeil, Builtin::MathSqrt],
        "vbl" => &[
            Builtin::VblLog,
            Builtin::VblNowIso,
            Builtin::VblToJson,
            Builtin::VblFromJson,
            Builtin::VblEnsure,
            Builtin::VblSafeGet,
            Builtin::VblEnv,
            Builtin::VblSuppress,
            Builtin::VblSpan,
        ],
        _ => return None,
    };

    let mut members: IndexMap<String, Val> = functions
        .iter()
        .map(|b| (b.member_name().to_string(), builtin_value(*b)))
        .collect();
    if name == "math" {
        members.insert("pi".to_string(), Val::Float(std::f64::consts::PI));
        members.insert("e".to_string(), Val::Float(std::f64::consts::E));
    }

    Some(Module {
        name: name.to_string(),
        members,
    })
}

/* ===================== json ===================== */

/// `json.dumps(value, indent=None)`; compact unless an indent is given
pub fn to_json(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next().to_json();
    let indent = args.kwarg("indent");
    args.finish()?;

    let text = match indent {
        None | Some(Val::Null) => serde_json::to_string(&value),
        Some(Val::Int(width)) => {
            let pad = " ".repeat(usize::try_from(width).unwrap_or(0));
            let mut out = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
            value
                .serialize(&mut serializer)
                .map(|_| String::from_utf8_lossy(&out).into_owned())
        }
        Some(other) => {
            return Err(Error::Type(format!(
                "indent must be an int, not {}",
                other.type_name()
            )))
        }
    };
    text.map(Val::Str)
        .map_err(|e| Error::value_error(format!("cannot serialize value: {}", e)))
}

pub fn from_json(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let first = args.next();
    let text = args.string(first)?;
    args.finish()?;

    serde_json::from_str::<serde_json::Value>(&text)
        .map(|v| Val::from_json(&v))
        .map_err(|e| Error::value_error(format!("invalid JSON: {}", e)))
}

/* ===================== time ===================== */

fn process_start() -> Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    *START.get_or_init(Instant::now)
}

/// Blocks the evaluating thread
pub fn sleep(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next();
    let seconds = args.number(&value)?;
    args.finish()?;

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::value_error("sleep length must be non-negative"));
    }
    std::thread::sleep(Duration::from_secs_f64(seconds));
    Ok(Val::Null)
}

pub fn time(args: Args) -> Result<Val> {
    args.arity(0, 0)?;
    args.finish()?;
    let now = chrono::Utc::now();
    Ok(Val::Float(now.timestamp_micros() as f64 / 1_000_000.0))
}

pub fn monotonic(args: Args) -> Result<Val> {
    args.arity(0, 0)?;
    args.finish()?;
    Ok(Val::Float(process_start().elapsed().as_secs_f64()))
}

/* ===================== math ===================== */

fn to_int(name: &str, x: f64) -> Result<Val> {
    if !x.is_finite() || x.abs() >= 9.2e18 {
        return Err(Error::Arithmetic(format!("{}() result out of range", name)));
    }
    Ok(Val::Int(x as i64))
}

pub fn floor(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next();
    args.finish()?;
    match value {
        Val::Int(n) => Ok(Val::Int(n)),
        other => to_int("floor", args_number("floor", &other)?.floor()),
    }
}

pub fn ceil(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next();
    args.finish()?;
    match value {
        Val::Int(n) => Ok(Val::Int(n)),
        other => to_int("ceil", args_number("ceil", &other)?.ceil()),
    }
}

pub fn sqrt(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next();
    let x = args.number(&value)?;
    args.finish()?;
    if x < 0.0 {
        return Err(Error::value_error("math domain error"));
    }
    Ok(Val::Float(x.sqrt()))
}

fn args_number(name: &str, value: &Val) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        Error::Type(format!(
            "math.{}() expected a number, got {}",
            name,
            value.type_name()
        ))
    })
}

/* ===================== vbl ===================== */

/// `vbl.log(message, **fields)` emits a `log` event
pub fn log(mut args: Args, reporter: &Reporter) -> Result<Val> {
    args.arity(1, 1)?;
    let message = args.next().to_string();
    let fields = args.take_kwargs();
    args.finish()?;

    let mut event = Event::new("log").field("message", message);
    for (key, value) in fields {
        event = event.field(key, value.to_json());
    }
    reporter.emit(event);
    Ok(Val::Null)
}

pub fn now_iso(args: Args) -> Result<Val> {
    args.arity(0, 0)?;
    args.finish()?;
    Ok(Val::Str(chrono::Utc::now().to_rfc3339()))
}

/// `vbl.ensure(condition, message="")` raises `ValueError` when falsy
pub fn ensure(mut args: Args) -> Result<Val> {
    args.arity(1, 2)?;
    let condition = args.next();
    let message = args
        .next_or_kwarg("message")
        .map(|m| m.to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "ensure() failed".to_string());
    args.finish()?;

    if condition.is_truthy() {
        Ok(Val::Null)
    } else {
        Err(Error::value_error(message))
    }
}

/// `vbl.safe_get(obj, path, default=None)` walks a dotted path or a list of
/// keys, yielding `default` at the first missing step
pub fn safe_get(mut args: Args) -> Result<Val> {
    args.arity(2, 3)?;
    let object = args.next();
    let path = args.next();
    let default = args.next_or_kwarg("default").unwrap_or(Val::Null);
    args.finish()?;

    let parts: Vec<Val> = match path {
        Val::Str(s) => s
            .split('.')
            .filter(|p| !p.is_empty())
            .map(Val::str)
            .collect(),
        Val::List(items) | Val::Tuple(items) => items,
        other => {
            return Err(Error::Type(format!(
                "safe_get() path must be a string or list, not {}",
                other.type_name()
            )))
        }
    };

    let mut current = object;
    for part in parts {
        let next = match (&current, &part) {
            (Val::Dict(map), Val::Str(key)) => map.get(key).cloned(),
            (Val::Module(module), Val::Str(key)) => module.members.get(key).cloned(),
            (Val::List(items) | Val::Tuple(items), Val::Int(i)) => {
                usize::try_from(*i).ok().and_then(|i| items.get(i).cloned())
            }
            (Val::List(items) | Val::Tuple(items), Val::Str(s)) => s
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned()),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(default),
        }
    }
    Ok(current)
}

pub fn env(mut args: Args) -> Result<Val> {
    args.arity(1, 2)?;
    let first = args.next();
    let name = args.string(first)?;
    let default = args.next_or_kwarg("default").unwrap_or(Val::Null);
    args.finish()?;

    Ok(std::env::var(&name).map(Val::Str).unwrap_or(default))
}
