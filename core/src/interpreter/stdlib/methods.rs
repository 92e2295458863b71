//! Methods on strings, sequences and dicts
//!
//! In-place methods take the receiver by `&mut`; the evaluator decides
//! whether that receiver is a variable binding or a temporary copy.

use super::{iterate, Args};
use crate::interpreter::errors::{Error, Result};
use crate::interpreter::types::Val;
use indexmap::IndexMap;

const STR_METHODS: &[&str] = &[
    "strip",
    "lstrip",
    "rstrip",
    "upper",
    "lower",
    "title",
    "capitalize",
    "split",
    "splitlines",
    "replace",
    "startswith",
    "endswith",
    "join",
    "find",
    "count",
    "isdigit",
    "format",
];

const SEQUENCE_METHODS: &[&str] = &["index", "count", "copy"];

const LIST_MUTATORS: &[&str] = &["append", "extend", "insert", "pop", "remove", "clear"];

const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "copy"];

const DICT_MUTATORS: &[&str] = &["update", "pop", "setdefault", "clear"];

/// Whether calling `name` may change its receiver
pub fn is_mutating(name: &str) -> bool {
    LIST_MUTATORS.contains(&name) || DICT_MUTATORS.contains(&name)
}

pub fn has_method(receiver: &Val, name: &str) -> bool {
    match receiver {
        Val::Str(_) => STR_METHODS.contains(&name),
        Val::List(_) => SEQUENCE_METHODS.contains(&name) || LIST_MUTATORS.contains(&name),
        Val::Tuple(_) => SEQUENCE_METHODS.contains(&name),
        Val::Dict(_) => DICT_METHODS.contains(&name) || DICT_MUTATORS.contains(&name),
        _ => false,
    }
}

/* ===================== Method Dispatcher ===================== */

pub fn call_method(
    receiver: &mut Val,
    name: &str,
    args: Vec<Val>,
    kwargs: IndexMap<String, Val>,
) -> Result<Val> {
    if !has_method(receiver, name) {
        return Err(Error::Attribute(format!(
            "'{}' object has no attribute '{}'",
            receiver.type_name(),
            name
        )));
    }
    let args = Args::new(format!("{}.{}", receiver.type_name(), name), args, kwargs);
    match receiver {
        Val::Str(s) => string_method(s, name, args),
        Val::List(items) => list_method(items, name, args),
        Val::Tuple(items) => sequence_method(items, name, args),
        Val::Dict(map) => dict_method(map, name, args),
        _ => Err(Error::Internal(format!("no dispatcher for method '{}'", name))),
    }
}

/* ===================== Strings ===================== */

fn strip_chars(args: &mut Args) -> Result<Option<Vec<char>>> {
    args.arity(0, 1)?;
    match args.next_opt() {
        None | Some(Val::Null) => Ok(None),
        Some(Val::Str(chars)) => Ok(Some(chars.chars().collect())),
        Some(other) => Err(args.type_error("str or None", &other)),
    }
}

fn string_method(s: &str, name: &str, mut args: Args) -> Result<Val> {
    let result = match name {
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(&mut args)?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            Val::str(match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            })
        }
        "upper" => {
            args.arity(0, 0)?;
            Val::Str(s.to_uppercase())
        }
        "lower" => {
            args.arity(0, 0)?;
            Val::Str(s.to_lowercase())
        }
        "title" => {
            args.arity(0, 0)?;
            Val::Str(title_case(s))
        }
        "capitalize" => {
            args.arity(0, 0)?;
            let mut chars = s.chars();
            Val::Str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            })
        }
        "split" => split(s, &mut args)?,
        "splitlines" => {
            args.arity(0, 0)?;
            Val::List(s.lines().map(Val::str).collect())
        }
        "replace" => {
            args.arity(2, 3)?;
            let old = args.next();
            let old = args.string(old)?;
            let new = args.next();
            let new = args.string(new)?;
            match args.next_or_kwarg("count") {
                Some(Val::Int(n)) if n >= 0 => Val::Str(s.replacen(&old, &new, n as usize)),
                _ => Val::Str(s.replace(&old, &new)),
            }
        }
        "startswith" | "endswith" => {
            args.arity(1, 1)?;
            let prefixes = match args.next() {
                Val::Str(p) => vec![p],
                Val::Tuple(items) | Val::List(items) => items
                    .into_iter()
                    .map(|p| args.string(p))
                    .collect::<Result<_>>()?,
                other => return Err(args.type_error("str or tuple", &other)),
            };
            let hit = prefixes.iter().any(|p| {
                if name == "startswith" {
                    s.starts_with(p.as_str())
                } else {
                    s.ends_with(p.as_str())
                }
            });
            Val::Bool(hit)
        }
        "join" => {
            args.arity(1, 1)?;
            let parts = iterate(&args.next())?
                .into_iter()
                .map(|p| match p {
                    Val::Str(part) => Ok(part),
                    other => Err(Error::Type(format!(
                        "sequence item: expected str instance, {} found",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Val::Str(parts.join(s))
        }
        "find" => {
            args.arity(1, 1)?;
            let needle = args.next();
            let needle = args.string(needle)?;
            Val::Int(match s.find(&needle) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            })
        }
        "count" => {
            args.arity(1, 1)?;
            let needle = args.next();
            let needle = args.string(needle)?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle.as_str()).count()
            };
            Val::Int(n as i64)
        }
        "isdigit" => {
            args.arity(0, 0)?;
            Val::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        }
        "format" => {
            let positional = args.rest();
            let named = args.take_kwargs();
            Val::Str(format_string(s, &positional, &named)?)
        }
        _ => unreachable_method(name)?,
    };
    args.finish()?;
    Ok(result)
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn split(s: &str, args: &mut Args) -> Result<Val> {
    args.arity(0, 2)?;
    let sep = args.next_or_kwarg("sep");
    let maxsplit = match args.next_or_kwarg("maxsplit") {
        Some(Val::Int(n)) if n >= 0 => Some(n as usize),
        Some(Val::Int(_)) | None => None,
        Some(other) => return Err(args.type_error("int for maxsplit", &other)),
    };

    let parts: Vec<Val> = match sep {
        None | Some(Val::Null) => {
            let mut parts = Vec::new();
            let mut rest = s.trim_start();
            while !rest.is_empty() {
                if maxsplit.is_some_and(|max| parts.len() == max) {
                    parts.push(Val::str(rest.trim_end()));
                    break;
                }
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                parts.push(Val::str(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            parts
        }
        Some(Val::Str(sep)) => {
            if sep.is_empty() {
                return Err(Error::value_error("empty separator"));
            }
            match maxsplit {
                Some(max) => s.splitn(max + 1, sep.as_str()).map(Val::str).collect(),
                None => s.split(sep.as_str()).map(Val::str).collect(),
            }
        }
        Some(other) => return Err(args.type_error("str or None", &other)),
    };
    Ok(Val::List(parts))
}

/// `{}`, `{0}` and `{name}` placeholders; `{{` and `}}` escape braces
fn format_string(template: &str, positional: &[Val], named: &IndexMap<String, Val>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(Error::value_error("unmatched '{' in format string"));
                        }
                    }
                }
                let value = if field.is_empty() {
                    let value = positional.get(auto_index);
                    auto_index += 1;
                    value
                } else if let Ok(index) = field.parse::<usize>() {
                    positional.get(index)
                } else {
                    named.get(&field)
                };
                match value {
                    Some(v) => out.push_str(&v.to_string()),
                    None => {
                        return Err(Error::Index(format!(
                            "format field '{}' has no matching argument",
                            field
                        )))
                    }
                }
            }
            '}' => return Err(Error::value_error("single '}' encountered in format string")),
            other => out.push(other),
        }
    }
    Ok(out)
}

/* ===================== Sequences ===================== */

fn sequence_method(items: &[Val], name: &str, mut args: Args) -> Result<Val> {
    let result = match name {
        "index" => {
            args.arity(1, 1)?;
            let needle = args.next();
            match items.iter().position(|item| *item == needle) {
                Some(i) => Val::Int(i as i64),
                None => return Err(Error::value_error(format!("{} is not in list", needle))),
            }
        }
        "count" => {
            args.arity(1, 1)?;
            let needle = args.next();
            Val::Int(items.iter().filter(|item| **item == needle).count() as i64)
        }
        "copy" => {
            args.arity(0, 0)?;
            Val::List(items.to_vec())
        }
        _ => unreachable_method(name)?,
    };
    args.finish()?;
    Ok(result)
}

/// Resolve a possibly negative index against a length
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { index + len } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn list_method(items: &mut Vec<Val>, name: &str, mut args: Args) -> Result<Val> {
    let result = match name {
        "append" => {
            args.arity(1, 1)?;
            items.push(args.next());
            Val::Null
        }
        "extend" => {
            args.arity(1, 1)?;
            items.extend(iterate(&args.next())?);
            Val::Null
        }
        "insert" => {
            args.arity(2, 2)?;
            let index = args.next();
            let index = args.integer(&index)?;
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, args.next());
            Val::Null
        }
        "pop" => {
            args.arity(0, 1)?;
            let index = match args.next_opt() {
                Some(v) => args.integer(&v)?,
                None => -1,
            };
            if items.is_empty() {
                return Err(Error::Index("pop from empty list".to_string()));
            }
            match normalize_index(index, items.len()) {
                Some(i) => items.remove(i),
                None => return Err(Error::Index("pop index out of range".to_string())),
            }
        }
        "remove" => {
            args.arity(1, 1)?;
            let needle = args.next();
            match items.iter().position(|item| *item == needle) {
                Some(i) => {
                    items.remove(i);
                }
                None => return Err(Error::value_error(format!("{} is not in list", needle))),
            }
            Val::Null
        }
        "clear" => {
            args.arity(0, 0)?;
            items.clear();
            Val::Null
        }
        _ => return sequence_method(items, name, args),
    };
    args.finish()?;
    Ok(result)
}

/* ===================== Dicts ===================== */

fn dict_key(args: &Args, key: Val) -> Result<String> {
    match key {
        Val::Str(k) => Ok(k),
        other => Err(Error::Type(format!(
            "{}: dict keys must be str, not {}",
            args.name(),
            other.type_name()
        ))),
    }
}

fn dict_method(map: &mut IndexMap<String, Val>, name: &str, mut args: Args) -> Result<Val> {
    let result = match name {
        "get" => {
            args.arity(1, 2)?;
            let key = args.next();
            let default = args.next_or_kwarg("default").unwrap_or(Val::Null);
            match key {
                Val::Str(k) => map.get(&k).cloned().unwrap_or(default),
                _ => default,
            }
        }
        "keys" => {
            args.arity(0, 0)?;
            Val::List(map.keys().map(|k| Val::str(k.as_str())).collect())
        }
        "values" => {
            args.arity(0, 0)?;
            Val::List(map.values().cloned().collect())
        }
        "items" => {
            args.arity(0, 0)?;
            Val::List(
                map.iter()
                    .map(|(k, v)| Val::Tuple(vec![Val::str(k.as_str()), v.clone()]))
                    .collect(),
            )
        }
        "copy" => {
            args.arity(0, 0)?;
            Val::Dict(map.clone())
        }
        "update" => {
            args.arity(0, 1)?;
            match args.next_opt() {
                Some(Val::Dict(other)) => map.extend(other),
                Some(Val::Null) | None => {}
                Some(other) => return Err(args.type_error("dict", &other)),
            }
            map.extend(args.take_kwargs());
            Val::Null
        }
        "pop" => {
            args.arity(1, 2)?;
            let key = args.next();
            let key = dict_key(&args, key)?;
            let default = args.next_opt();
            match (map.shift_remove(&key), default) {
                (Some(value), _) => value,
                (None, Some(default)) => default,
                (None, None) => return Err(Error::Index(format!("key '{}' not found", key))),
            }
        }
        "setdefault" => {
            args.arity(1, 2)?;
            let key = args.next();
            let key = dict_key(&args, key)?;
            let default = args.next_opt().unwrap_or(Val::Null);
            map.entry(key).or_insert(default).clone()
        }
        "clear" => {
            args.arity(0, 0)?;
            map.clear();
            Val::Null
        }
        _ => unreachable_method(name)?,
    };
    args.finish()?;
    Ok(result)
}

fn unreachable_method(name: &str) -> Result<Val> {
    Err(Error::Internal(format!("method '{}' is listed but not implemented", name)))
}
