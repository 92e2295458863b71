//! Global builtin functions

use super::{iterate, Args};
use crate::interpreter::errors::{Error, Result};
use crate::interpreter::executor::operators;
use crate::interpreter::report::{Event, Reporter};
use crate::interpreter::types::{ErrorValue, Val};
use std::cmp::Ordering;

pub fn len(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next();
    let n = match &value {
        Val::Str(s) => s.chars().count(),
        Val::List(items) | Val::Tuple(items) => items.len(),
        Val::Dict(map) => map.len(),
        other => {
            return Err(Error::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    };
    args.finish()?;
    Ok(Val::Int(n as i64))
}

pub fn str(mut args: Args) -> Result<Val> {
    args.arity(0, 1)?;
    let value = args.next_opt();
    args.finish()?;
    Ok(Val::Str(value.map(|v| v.to_string()).unwrap_or_default()))
}

pub fn int(mut args: Args) -> Result<Val> {
    args.arity(0, 1)?;
    let value = args.next_opt().unwrap_or(Val::Int(0));
    args.finish()?;
    match value {
        Val::Int(n) => Ok(Val::Int(n)),
        Val::Bool(b) => Ok(Val::Int(b as i64)),
        Val::Float(f) if f.is_finite() && f.abs() < 9.2e18 => Ok(Val::Int(f.trunc() as i64)),
        Val::Float(f) => Err(Error::value_error(format!("cannot convert float {} to integer", f))),
        Val::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Val::Int)
            .map_err(|_| Error::value_error(format!("invalid literal for int(): '{}'", s))),
        other => Err(Error::Type(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

pub fn float(mut args: Args) -> Result<Val> {
    args.arity(0, 1)?;
    let value = args.next_opt().unwrap_or(Val::Float(0.0));
    args.finish()?;
    match value {
        Val::Int(n) => Ok(Val::Float(n as f64)),
        Val::Float(f) => Ok(Val::Float(f)),
        Val::Bool(b) => Ok(Val::Float(if b { 1.0 } else { 0.0 })),
        Val::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Val::Float)
            .map_err(|_| Error::value_error(format!("could not convert string to float: '{}'", s))),
        other => Err(Error::Type(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

pub fn bool(mut args: Args) -> Result<Val> {
    args.arity(0, 1)?;
    let value = args.next_opt().unwrap_or(Val::Bool(false));
    args.finish()?;
    Ok(Val::Bool(value.is_truthy()))
}

pub fn list(mut args: Args) -> Result<Val> {
    args.arity(0, 1)?;
    let items = match args.next_opt() {
        Some(value) => iterate(&value)?,
        None => Vec::new(),
    };
    args.finish()?;
    Ok(Val::List(items))
}

pub fn range(mut args: Args) -> Result<Val> {
    args.arity(1, 3)?;
    let count = args.len();
    let values: Vec<i64> = args
        .rest()
        .iter()
        .map(|v| args.integer(v))
        .collect::<Result<_>>()?;
    args.finish()?;

    let (start, stop, step) = match count {
        1 => (0, values[0], 1),
        2 => (values[0], values[1], 1),
        _ => (values[0], values[1], values[2]),
    };
    if step == 0 {
        return Err(Error::value_error("range() arg 3 must not be zero"));
    }
    let span = if step > 0 {
        (i128::from(stop) - i128::from(start) + i128::from(step) - 1) / i128::from(step)
    } else {
        (i128::from(start) - i128::from(stop) - i128::from(step) - 1) / -i128::from(step)
    };
    if span > operators::MAX_SEQUENCE_LEN as i128 {
        return Err(Error::Arithmetic(format!(
            "range() would exceed {} items",
            operators::MAX_SEQUENCE_LEN
        )));
    }

    let mut out = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        out.push(Val::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Val::List(out))
}

/// Sort values with the comparison operators' ordering, surfacing the first
/// incomparable pair as a `TypeError`
pub(crate) fn sort_values(items: &mut [Val]) -> Result<()> {
    let mut failure = None;
    items.sort_by(|a, b| match operators::sort_order(a, b) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub fn sorted(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let mut items = iterate(&args.next())?;
    let reverse = args.kwarg("reverse").map(|v| v.is_truthy()).unwrap_or(false);
    args.finish()?;

    sort_values(&mut items)?;
    if reverse {
        items.reverse();
    }
    Ok(Val::List(items))
}

pub fn sum(mut args: Args) -> Result<Val> {
    args.arity(1, 2)?;
    let items = iterate(&args.next())?;
    let start = args.next_or_kwarg("start").unwrap_or(Val::Int(0));
    args.finish()?;

    items
        .iter()
        .try_fold(start, |acc, item| operators::add(&acc, item))
}

/// `min` (`wanted == Less`) and `max` (`wanted == Greater`)
pub fn extreme(mut args: Args, wanted: Ordering) -> Result<Val> {
    args.arity(1, usize::MAX)?;
    let name = args.name().to_string();
    let items = if args.len() == 1 {
        iterate(&args.next())?
    } else {
        args.rest()
    };
    let default = args.kwarg("default");
    args.finish()?;

    let mut best: Option<Val> = None;
    for item in items {
        best = Some(match best {
            None => item,
            Some(current) => {
                if operators::sort_order(&item, &current)? == wanted {
                    item
                } else {
                    current
                }
            }
        });
    }
    best.or(default)
        .ok_or_else(|| Error::value_error(format!("{}() arg is an empty sequence", name)))
}

pub fn abs(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next();
    args.finish()?;
    match value {
        Val::Int(n) => n
            .checked_abs()
            .map(Val::Int)
            .ok_or_else(|| Error::Arithmetic("integer overflow in abs()".to_string())),
        Val::Float(f) => Ok(Val::Float(f.abs())),
        other => Err(Error::Type(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

/// Rounds half to even; without `ndigits` the result is an int
pub fn round(mut args: Args) -> Result<Val> {
    args.arity(1, 2)?;
    let value = args.next();
    let ndigits = args.next_or_kwarg("ndigits");
    args.finish()?;

    let x = match &value {
        Val::Int(n) if ndigits.is_none() => return Ok(Val::Int(*n)),
        Val::Int(n) => *n as f64,
        Val::Float(f) => *f,
        other => {
            return Err(Error::Type(format!(
                "type {} doesn't define round()",
                other.type_name()
            )))
        }
    };

    match ndigits {
        None | Some(Val::Null) => {
            let rounded = x.round_ties_even();
            if !rounded.is_finite() {
                return Err(Error::value_error(format!("cannot convert float {} to integer", x)));
            }
            Ok(Val::Int(rounded as i64))
        }
        Some(Val::Int(digits)) => {
            let factor = 10f64.powi(digits.clamp(-308, 308) as i32);
            Ok(Val::Float((x * factor).round_ties_even() / factor))
        }
        Some(other) => Err(Error::Type(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

/// Emits a `print` event carrying the rendered message
pub fn print(mut args: Args, reporter: &Reporter) -> Result<Val> {
    let sep = match args.kwarg("sep") {
        Some(Val::Str(s)) => s,
        Some(other) => return Err(args.type_error("str for sep", &other)),
        None => " ".to_string(),
    };
    let message = args
        .rest()
        .iter()
        .map(Val::to_string)
        .collect::<Vec<_>>()
        .join(&sep);
    args.finish()?;

    reporter.emit(Event::new("print").field("message", message));
    Ok(Val::Null)
}

pub fn enumerate(mut args: Args) -> Result<Val> {
    args.arity(1, 2)?;
    let items = iterate(&args.next())?;
    let start = match args.next_or_kwarg("start") {
        Some(v) => args.integer(&v)?,
        None => 0,
    };
    args.finish()?;

    Ok(Val::List(
        items
            .into_iter()
            .zip(start..)
            .map(|(item, i)| Val::Tuple(vec![Val::Int(i), item]))
            .collect(),
    ))
}

pub fn zip(mut args: Args) -> Result<Val> {
    let sequences = args
        .rest()
        .iter()
        .map(iterate)
        .collect::<Result<Vec<_>>>()?;
    args.finish()?;

    let shortest = sequences.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Val::List(
        (0..shortest)
            .map(|i| Val::Tuple(sequences.iter().map(|s| s[i].clone()).collect()))
            .collect(),
    ))
}

pub fn any(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let items = iterate(&args.next())?;
    args.finish()?;
    Ok(Val::Bool(items.iter().any(Val::is_truthy)))
}

pub fn all(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let items = iterate(&args.next())?;
    args.finish()?;
    Ok(Val::Bool(items.iter().all(Val::is_truthy)))
}

pub fn not(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next();
    args.finish()?;
    Ok(Val::Bool(!value.is_truthy()))
}

/// `error(kind, message)` builds an error value for `raise`
pub fn error(mut args: Args) -> Result<Val> {
    args.arity(1, 2)?;
    let first = args.next();
    let kind = args.string(first)?;
    let message = match args.next_or_kwarg("message") {
        Some(v) => v.to_string(),
        None => String::new(),
    };
    args.finish()?;
    Ok(Val::Error(ErrorValue { kind, message }))
}

pub fn type_of(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let value = args.next();
    args.finish()?;
    Ok(Val::str(value.type_name()))
}
