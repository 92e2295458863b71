//! Binary operators
//!
//! `and`/`or` short-circuit and are handled by the evaluator; everything
//! else is a pure function of two values.

use crate::interpreter::errors::{Error, Result};
use crate::interpreter::types::{BinOp, Val};
use std::cmp::Ordering;

pub fn apply(op: BinOp, left: &Val, right: &Val) -> Result<Val> {
    match op {
        BinOp::Add => add(left, right),
        BinOp::Sub => arithmetic(op, left, right, i64::checked_sub, |a, b| a - b),
        BinOp::Mul => mul(left, right),
        BinOp::Div => div(left, right),
        BinOp::FloorDiv => floor_div(left, right),
        BinOp::Mod => modulo(left, right),
        BinOp::Pow => pow(left, right),
        BinOp::Eq => Ok(Val::Bool(left == right)),
        BinOp::Ne => Ok(Val::Bool(left != right)),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ordering = ordering(op, left, right)?;
            Ok(Val::Bool(match ordering {
                None => false,
                Some(ord) => match op {
                    BinOp::Lt => ord == Ordering::Less,
                    BinOp::Gt => ord == Ordering::Greater,
                    BinOp::Le => ord != Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
            }))
        }
        BinOp::In => Ok(Val::Bool(contains(right, left)?)),
        BinOp::NotIn => Ok(Val::Bool(!contains(right, left)?)),
        // short-circuit forms, evaluated eagerly when reached here
        BinOp::And => Ok(if left.is_truthy() { right.clone() } else { left.clone() }),
        BinOp::Or => Ok(if left.is_truthy() { left.clone() } else { right.clone() }),
    }
}

fn unsupported(op: BinOp, left: &Val, right: &Val) -> Error {
    Error::Type(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn overflow(op: BinOp) -> Error {
    Error::Arithmetic(format!("integer overflow in '{}'", op.symbol()))
}

fn arithmetic(
    op: BinOp,
    left: &Val,
    right: &Val,
    ints: fn(i64, i64) -> Option<i64>,
    floats: fn(f64, f64) -> f64,
) -> Result<Val> {
    match (left, right) {
        (Val::Int(a), Val::Int(b)) => ints(*a, *b).map(Val::Int).ok_or_else(|| overflow(op)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Val::Float(floats(a, b))),
            _ => Err(unsupported(op, left, right)),
        },
    }
}

pub fn add(left: &Val, right: &Val) -> Result<Val> {
    match (left, right) {
        (Val::Str(a), Val::Str(b)) => Ok(Val::Str(format!("{}{}", a, b))),
        (Val::List(a), Val::List(b)) => Ok(Val::List(a.iter().chain(b).cloned().collect())),
        (Val::Tuple(a), Val::Tuple(b)) => Ok(Val::Tuple(a.iter().chain(b).cloned().collect())),
        _ => arithmetic(BinOp::Add, left, right, i64::checked_add, |a, b| a + b),
    }
}

/// Upper bound on the length of a sequence built by repetition or `range`
pub(crate) const MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Length of `unit` repeated `n` times, negative counts meaning zero
fn repeated_len(unit: usize, n: i64) -> Result<usize> {
    let count = usize::try_from(n).unwrap_or(0);
    unit.checked_mul(count)
        .filter(|len| *len <= MAX_SEQUENCE_LEN)
        .ok_or_else(|| {
            Error::Arithmetic(format!(
                "repeated sequence would exceed {} items",
                MAX_SEQUENCE_LEN
            ))
        })
}

fn mul(left: &Val, right: &Val) -> Result<Val> {
    match (left, right) {
        (Val::Str(s), Val::Int(n)) | (Val::Int(n), Val::Str(s)) => {
            repeated_len(s.len(), *n)?;
            Ok(Val::Str(s.repeat(usize::try_from(*n).unwrap_or(0))))
        }
        (Val::List(items), Val::Int(n)) | (Val::Int(n), Val::List(items)) => {
            let len = repeated_len(items.len(), *n)?;
            Ok(Val::List(items.iter().cloned().cycle().take(len).collect()))
        }
        _ => arithmetic(BinOp::Mul, left, right, i64::checked_mul, |a, b| a * b),
    }
}

fn numbers(op: BinOp, left: &Val, right: &Val) -> Result<(f64, f64)> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(unsupported(op, left, right)),
    }
}

fn zero_division() -> Error {
    Error::Arithmetic("division by zero".to_string())
}

fn div(left: &Val, right: &Val) -> Result<Val> {
    let (a, b) = numbers(BinOp::Div, left, right)?;
    if b == 0.0 {
        return Err(zero_division());
    }
    Ok(Val::Float(a / b))
}

fn floor_div(left: &Val, right: &Val) -> Result<Val> {
    match (left, right) {
        (Val::Int(_), Val::Int(0)) => Err(zero_division()),
        (Val::Int(a), Val::Int(b)) => {
            let q = a.checked_div(*b).ok_or_else(|| overflow(BinOp::FloorDiv))?;
            let adjust = (a % b != 0) && ((*a < 0) != (*b < 0));
            Ok(Val::Int(if adjust { q - 1 } else { q }))
        }
        _ => {
            let (a, b) = numbers(BinOp::FloorDiv, left, right)?;
            if b == 0.0 {
                return Err(zero_division());
            }
            Ok(Val::Float((a / b).floor()))
        }
    }
}

/// Result takes the sign of the divisor
fn modulo(left: &Val, right: &Val) -> Result<Val> {
    match (left, right) {
        (Val::Int(_), Val::Int(0)) => Err(zero_division()),
        (Val::Int(a), Val::Int(b)) => {
            let r = a.checked_rem(*b).ok_or_else(|| overflow(BinOp::Mod))?;
            Ok(Val::Int(if r != 0 && ((r < 0) != (*b < 0)) { r + b } else { r }))
        }
        _ => {
            let (a, b) = numbers(BinOp::Mod, left, right)?;
            if b == 0.0 {
                return Err(zero_division());
            }
            Ok(Val::Float(a - b * (a / b).floor()))
        }
    }
}

fn pow(left: &Val, right: &Val) -> Result<Val> {
    match (left, right) {
        (Val::Int(a), Val::Int(b)) if *b >= 0 => {
            let exp = u32::try_from(*b).map_err(|_| overflow(BinOp::Pow))?;
            a.checked_pow(exp).map(Val::Int).ok_or_else(|| overflow(BinOp::Pow))
        }
        _ => {
            let (a, b) = numbers(BinOp::Pow, left, right)?;
            if a == 0.0 && b < 0.0 {
                return Err(zero_division());
            }
            Ok(Val::Float(a.powf(b)))
        }
    }
}

/// Ordering for comparison operators; `None` when floats are unordered (NaN)
pub fn ordering(op: BinOp, left: &Val, right: &Val) -> Result<Option<Ordering>> {
    match (left, right) {
        (Val::Int(a), Val::Int(b)) => Ok(Some(a.cmp(b))),
        (Val::Str(a), Val::Str(b)) => Ok(Some(a.cmp(b))),
        (Val::Bool(a), Val::Bool(b)) => Ok(Some(a.cmp(b))),
        (Val::List(a), Val::List(b)) | (Val::Tuple(a), Val::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                if x == y {
                    continue;
                }
                return ordering(op, x, y);
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(Error::Type(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

/// Total order used by `sorted`, `min` and `max`
pub fn sort_order(left: &Val, right: &Val) -> Result<Ordering> {
    Ok(ordering(BinOp::Lt, left, right)?.unwrap_or(Ordering::Equal))
}

pub fn contains(container: &Val, item: &Val) -> Result<bool> {
    match container {
        Val::Str(haystack) => match item {
            Val::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(Error::Type(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Val::List(items) | Val::Tuple(items) => Ok(items.contains(item)),
        Val::Dict(map) => match item {
            Val::Str(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        other => Err(Error::Type(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Val {
        Val::Int(n)
    }

    #[test]
    fn test_int_float_promotion() {
        assert_eq!(apply(BinOp::Add, &int(1), &Val::Float(0.5)).ok(), Some(Val::Float(1.5)));
        assert_eq!(apply(BinOp::Div, &int(3), &int(2)).ok(), Some(Val::Float(1.5)));
        assert_eq!(apply(BinOp::Mul, &int(3), &int(4)).ok(), Some(int(12)));
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(apply(BinOp::FloorDiv, &int(-7), &int(2)).ok(), Some(int(-4)));
        assert_eq!(apply(BinOp::Mod, &int(-7), &int(2)).ok(), Some(int(1)));
        assert_eq!(apply(BinOp::Mod, &int(7), &int(-2)).ok(), Some(int(-1)));
    }

    #[test]
    fn test_division_by_zero() {
        let err = apply(BinOp::Div, &int(1), &int(0)).expect_err("Should fail");
        assert_eq!(err.kind(), "ArithmeticError");
        assert!(apply(BinOp::Mod, &int(1), &int(0)).is_err());
    }

    #[test]
    fn test_sequence_repetition() {
        let ab = Val::Str("ab".to_string());
        assert_eq!(apply(BinOp::Mul, &ab, &int(3)).ok(), Some(Val::Str("ababab".to_string())));
        assert_eq!(apply(BinOp::Mul, &int(-1), &ab).ok(), Some(Val::Str(String::new())));
        let list = Val::List(vec![int(1), int(2)]);
        assert_eq!(
            apply(BinOp::Mul, &list, &int(2)).ok(),
            Some(Val::List(vec![int(1), int(2), int(1), int(2)]))
        );
    }

    #[test]
    fn test_oversized_repetition_is_arithmetic_error() {
        let ab = Val::Str("ab".to_string());
        let err = apply(BinOp::Mul, &ab, &int(4611686018427387904)).expect_err("Should refuse");
        assert_eq!(err.kind(), "ArithmeticError");

        let err = apply(BinOp::Mul, &ab, &int(100_000_000_000)).expect_err("Should refuse");
        assert_eq!(err.kind(), "ArithmeticError");

        let list = Val::List(vec![int(1), int(2), int(3)]);
        let err = apply(BinOp::Mul, &int(i64::MAX), &list).expect_err("Should refuse");
        assert_eq!(err.kind(), "ArithmeticError");
    }

    #[test]
    fn test_overflow_is_arithmetic_error() {
        let err = apply(BinOp::Pow, &int(10), &int(40)).expect_err("Should overflow");
        assert_eq!(err.kind(), "ArithmeticError");
    }

    #[test]
    fn test_sequences() {
        assert_eq!(apply(BinOp::Add, &Val::str("ab"), &Val::str("c")).ok(), Some(Val::str("abc")));
        assert_eq!(apply(BinOp::Mul, &Val::str("ab"), &int(2)).ok(), Some(Val::str("abab")));
        assert_eq!(
            apply(BinOp::Mul, &Val::List(vec![int(1)]), &int(3)).ok(),
            Some(Val::List(vec![int(1), int(1), int(1)]))
        );
    }

    #[test]
    fn test_type_errors() {
        let err = apply(BinOp::Add, &int(1), &Val::str("a")).expect_err("Should fail");
        assert_eq!(err.kind(), "TypeError");
        assert!(err.to_string().contains("'int' and 'str'"));

        let err = apply(BinOp::Lt, &int(1), &Val::str("a")).expect_err("Should fail");
        assert_eq!(err.kind(), "TypeError");
    }

    #[test]
    fn test_membership() {
        assert_eq!(apply(BinOp::In, &Val::str("100%"), &Val::str("100% OFF")).ok(), Some(Val::Bool(true)));
        assert_eq!(apply(BinOp::NotIn, &int(2), &Val::List(vec![int(1)])).ok(), Some(Val::Bool(true)));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(apply(BinOp::Le, &int(2), &Val::Float(2.0)).ok(), Some(Val::Bool(true)));
        assert_eq!(apply(BinOp::Gt, &Val::str("b"), &Val::str("a")).ok(), Some(Val::Bool(true)));
        assert_eq!(
            apply(BinOp::Lt, &Val::List(vec![int(1), int(2)]), &Val::List(vec![int(1), int(3)])).ok(),
            Some(Val::Bool(true))
        );
    }
}
