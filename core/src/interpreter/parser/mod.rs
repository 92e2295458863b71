//! Surface parser - pest grammar for the parenthesized program syntax
//!
//! Source text is read into positioned data (lists, strings, atoms) and then
//! lowered form by form into the JSON IR document, so that surface files and
//! hand-written JSON share one decoder.
//!
//! ```text
//! (meta (name "Echo Pipeline"))
//! (input raw "  hello  ")
//! (step normalize (params text) (return (call (attr text strip))))
//! (run (normalize raw))
//! ```

use pest::Parser;
use pest_derive::Parser;
use serde_json::{json, Map, Value as JsonValue};

use super::errors::{Error, Result};
use super::ir;
use super::types::{BinOp, Program};


/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "interpreter/parser/surface.pest"]
struct SurfaceParser;

/* ===================== Public API ===================== */

/// Parse surface source into a validated program
pub fn parse_program(source: &str) -> Result<Program> {
    ir::decode(&parse_to_ir(source)?)
}

/// Parse surface source into its JSON IR document (not yet validated)
pub fn parse_to_ir(source: &str) -> Result<JsonValue> {
    let forms = read(source)?;

    let mut meta = Map::new();
    let mut imports = Vec::new();
    let mut inputs = Map::new();
    let mut steps = Vec::new();
    let mut run = None;

    for form in &forms {
        let items = form.as_list().filter(|items| !items.is_empty()).ok_or_else(|| {
            form.error("top-level forms must be non-empty lists")
        })?;
        let head = items[0].symbol("top-level forms must start with a symbol")?;

        match head {
            "meta" => {
                for entry in &items[1..] {
                    let (key, value) = entry.pair("meta entries must be (key value)")?;
                    meta.insert(key.symbol("meta key must be a symbol")?.to_string(), value.to_json());
                }
            }
            "import" => match &items[1..] {
                [module] => imports.push(JsonValue::String(module.name_or_string("import module")?)),
                [module, as_kw, alias] if as_kw.is_symbol("as") => imports.push(json!({
                    "import": module.name_or_string("import module")?,
                    "as": alias.symbol("import alias must be a symbol")?,
                })),
                _ => return Err(form.error("import form: (import module) or (import module as alias)")),
            },
            "from" => match &items[1..] {
                [module, import_kw, names @ ..] if import_kw.is_symbol("import") && !names.is_empty() => {
                    let names = names
                        .iter()
                        .map(|n| n.symbol("imported name must be a symbol").map(str::to_string))
                        .collect::<Result<Vec<_>>>()?;
                    imports.push(json!({ "from": module.name_or_string("from module")?, "import": names }));
                }
                _ => return Err(form.error("from form: (from module import name1 name2)")),
            },
            "input" => match &items[1..] {
                [name, value] => {
                    inputs.insert(name.symbol("input name must be a symbol")?.to_string(), value.to_json());
                }
                _ => return Err(form.error("input form: (input name value)")),
            },
            "inputs" => {
                for entry in &items[1..] {
                    let (name, value) = entry.pair("inputs entries must be (name value)")?;
                    inputs.insert(name.symbol("input name must be a symbol")?.to_string(), value.to_json());
                }
            }
            "step" => steps.push(lower_step(form, items)?),
            "run" => {
                let [node] = &items[1..] else {
                    return Err(form.error("run requires a single expression or block"));
                };
                run = Some(match node.head() {
                    Some("block") => json!({ "block": lower_stmts(&node.tail())? }),
                    _ => lower_expr(node)?,
                });
            }
            other => return Err(items[0].error(format!("unknown top-level form: {}", other))),
        }
    }

    let Some(run) = run else {
        let (line, column) = end_position(source);
        return Err(Error::Parse {
            line,
            column,
            message: "program requires a run form".to_string(),
        });
    };

    Ok(json!({
        "meta": meta,
        "imports": imports,
        "inputs": inputs,
        "steps": steps,
        "run": run,
    }))
}

/* ===================== Reader ===================== */

#[derive(Debug, Clone, PartialEq)]
enum DatumKind {
    List(Vec<Datum>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Symbol(String),
}

/// One read datum with its source position (1-based)
#[derive(Debug, Clone, PartialEq)]
struct Datum {
    kind: DatumKind,
    line: usize,
    column: usize,
}

fn read(source: &str) -> Result<Vec<Datum>> {
    let mut pairs = SurfaceParser::parse(Rule::program, source).map_err(|err| {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        Error::Parse {
            line,
            column,
            message: err.variant.message().to_string(),
        }
    })?;

    let program = pairs.next().ok_or_else(|| Error::Parse {
        line: 1,
        column: 1,
        message: "empty parse".to_string(),
    })?;

    program
        .into_inner()
        .filter(|pair| pair.as_rule() != Rule::EOI)
        .map(build_datum)
        .collect()
}

fn build_datum(pair: pest::iterators::Pair<Rule>) -> Result<Datum> {
    let (line, column) = pair.as_span().start_pos().line_col();
    let kind = match pair.as_rule() {
        Rule::list => DatumKind::List(pair.into_inner().map(build_datum).collect::<Result<_>>()?),
        Rule::string => {
            // string = ${ "\"" ~ inner ~ "\"" }
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            DatumKind::Str(unescape(raw))
        }
        Rule::atom => classify_atom(pair.as_str()),
        other => {
            return Err(Error::Parse {
                line,
                column,
                message: format!("unexpected rule: {:?}", other),
            })
        }
    };
    Ok(Datum { kind, line, column })
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// `-?digits(.digits)?` is a number; `true`/`false`/`null` are literals
fn classify_atom(text: &str) -> DatumKind {
    match text {
        "true" => return DatumKind::Bool(true),
        "false" => return DatumKind::Bool(false),
        "null" => return DatumKind::Null,
        _ => {}
    }

    let digits = text.strip_prefix('-').unwrap_or(text);
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let numeric = match digits.split_once('.') {
        Some((whole, frac)) => all_digits(whole) && all_digits(frac),
        None => all_digits(digits),
    };

    if numeric {
        if !text.contains('.') {
            if let Ok(n) = text.parse::<i64>() {
                return DatumKind::Int(n);
            }
        }
        if let Ok(n) = text.parse::<f64>() {
            return DatumKind::Float(n);
        }
    }
    DatumKind::Symbol(text.to_string())
}

fn end_position(source: &str) -> (usize, usize) {
    let line = source.lines().count().max(1);
    let column = source.lines().last().map(|l| l.chars().count() + 1).unwrap_or(1);
    (line, column)
}

impl Datum {
    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn as_list(&self) -> Option<&[Datum]> {
        match &self.kind {
            DatumKind::List(items) => Some(items),
            _ => None,
        }
    }

    fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            DatumKind::Symbol(name) => Some(name),
            _ => None,
        }
    }

    fn is_symbol(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }

    fn symbol(&self, message: &str) -> Result<&str> {
        self.as_symbol().ok_or_else(|| self.error(message))
    }

    fn name_or_string(&self, what: &str) -> Result<String> {
        match &self.kind {
            DatumKind::Symbol(name) | DatumKind::Str(name) => Ok(name.clone()),
            _ => Err(self.error(format!("{} must be a symbol or string", what))),
        }
    }

    /// Head symbol of a non-empty list
    fn head(&self) -> Option<&str> {
        self.as_list().and_then(|items| items.first()).and_then(Datum::as_symbol)
    }

    /// Items after the head of a list
    fn tail(&self) -> Vec<Datum> {
        self.as_list().map(|items| items[1..].to_vec()).unwrap_or_default()
    }

    fn pair(&self, message: &str) -> Result<(&Datum, &Datum)> {
        match self.as_list() {
            Some([a, b]) => Ok((a, b)),
            _ => Err(self.error(message)),
        }
    }

    /// Plain data view: symbols become their names
    fn to_json(&self) -> JsonValue {
        match &self.kind {
            DatumKind::List(items) => JsonValue::Array(items.iter().map(Datum::to_json).collect()),
            DatumKind::Str(s) | DatumKind::Symbol(s) => JsonValue::String(s.clone()),
            DatumKind::Int(n) => json!(n),
            DatumKind::Float(n) => json!(n),
            DatumKind::Bool(b) => json!(b),
            DatumKind::Null => JsonValue::Null,
        }
    }
}

/* ===================== Steps ===================== */

fn lower_step(form: &Datum, items: &[Datum]) -> Result<JsonValue> {
    let Some(name) = items.get(1) else {
        return Err(form.error("step requires a name"));
    };
    let mut step = Map::new();
    step.insert("name".into(), json!(name.symbol("step name must be a symbol")?));
    step.insert("params".into(), json!([]));

    for part in &items[2..] {
        let parts = part
            .as_list()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| part.error("step options must be lists"))?;
        let key = parts[0].symbol("step option must start with a symbol")?;
        let args = &parts[1..];

        match key {
            "params" => {
                let params = args
                    .iter()
                    .map(|p| p.symbol("params must be symbols").map(str::to_string))
                    .collect::<Result<Vec<_>>>()?;
                step.insert("params".into(), json!(params));
            }
            "retry" => match args {
                [Datum {
                    kind: DatumKind::Int(n),
                    ..
                }] => {
                    step.insert("retry".into(), json!(n));
                }
                _ => return Err(part.error("retry requires integer")),
            },
            "timeout" => match args {
                [Datum {
                    kind: DatumKind::Int(n),
                    ..
                }] => {
                    step.insert("timeout".into(), json!(n));
                }
                [Datum {
                    kind: DatumKind::Float(n),
                    ..
                }] => {
                    step.insert("timeout".into(), json!(n));
                }
                _ => return Err(part.error("timeout requires a number of seconds")),
            },
            "guard" => {
                let tokens = args
                    .iter()
                    .map(|g| match &g.kind {
                        DatumKind::Str(s) => Ok(s.clone()),
                        _ => Err(g.error("guard entries must be strings")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                step.insert("guard".into(), json!(tokens));
            }
            "produces" => match args {
                [value] => {
                    step.insert("produces".into(), value.to_json());
                }
                _ => return Err(part.error("produces requires value")),
            },
            "body" => {
                let strings: Vec<&str> = args
                    .iter()
                    .filter_map(|a| match &a.kind {
                        DatumKind::Str(s) => Some(s.as_str()),
                        _ => None,
                    })
                    .collect();
                let body = if args.is_empty() {
                    json!({ "block": [] })
                } else if strings.len() == args.len() {
                    json!(strings)
                } else if !strings.is_empty() {
                    return Err(part.error("body must be all strings or all statements"));
                } else {
                    json!({ "block": lower_stmts(args)? })
                };
                step.insert("body".into(), body);
            }
            "return" => match args {
                [expr] => {
                    step.insert("return".into(), lower_expr(expr)?);
                }
                _ => return Err(part.error("return requires expression")),
            },
            other => return Err(parts[0].error(format!("unknown step attribute: {}", other))),
        }
    }

    Ok(JsonValue::Object(step))
}

/* ===================== Statements ===================== */

fn lower_stmts(nodes: &[Datum]) -> Result<Vec<JsonValue>> {
    nodes.iter().map(lower_stmt).collect()
}

/// Body of a `(tag stmt...)` part, checking the tag
fn tagged_block(node: &Datum, tags: &[&str], message: &str) -> Result<Vec<JsonValue>> {
    match node.head() {
        Some(tag) if tags.contains(&tag) => lower_stmts(&node.tail()),
        _ => Err(node.error(message)),
    }
}

fn lower_stmt(node: &Datum) -> Result<JsonValue> {
    let Some(items) = node.as_list().filter(|items| !items.is_empty()) else {
        return Ok(json!({ "expr": lower_expr(node)? }));
    };
    let Some(head) = items[0].as_symbol() else {
        return Ok(json!({ "expr": lower_expr(node)? }));
    };
    let args = &items[1..];

    let stmt = match head {
        "set" => match args {
            [name, value] => json!({
                "set": { "name": name.symbol("set target must be a symbol")?, "value": lower_expr(value)? }
            }),
            _ => return Err(node.error("set requires name and value")),
        },
        "return" => match args {
            [value] => json!({ "return": lower_expr(value)? }),
            _ => return Err(node.error("return requires value")),
        },
        "expr" => match args {
            [value] => json!({ "expr": lower_expr(value)? }),
            _ => return Err(node.error("expr requires expression")),
        },
        "python" => {
            let lines = args
                .iter()
                .map(|a| match &a.kind {
                    DatumKind::Str(s) => Ok(s.clone()),
                    _ => Err(a.error("python statements must be strings")),
                })
                .collect::<Result<Vec<_>>>()?;
            json!({ "python": lines })
        }
        "if" => {
            let [cond, parts @ ..] = args else {
                return Err(node.error("if requires condition and body"));
            };
            if parts.is_empty() {
                return Err(node.error("if requires condition and body"));
            }
            let mut then_block = Vec::new();
            let mut else_block = Vec::new();
            for part in parts {
                match part.head() {
                    Some("then") | Some("do") => then_block = lower_stmts(&part.tail())?,
                    Some("else") => else_block = lower_stmts(&part.tail())?,
                    _ => return Err(part.error("if body must be (then ...) or (else ...)")),
                }
            }
            json!({ "if": { "cond": lower_expr(cond)?, "then": then_block, "else": else_block } })
        }
        "for" => {
            let [var, iter, body, ..] = args else {
                return Err(node.error("for requires var, iter, and body"));
            };
            json!({
                "for": {
                    "var": var.symbol("for variable must be a symbol")?,
                    "iter": lower_expr(iter)?,
                    "body": tagged_block(body, &["do"], "for body must be (do ...)")?,
                }
            })
        }
        "while" => {
            let [cond, body, rest @ ..] = args else {
                return Err(node.error("while requires condition and body"));
            };
            let mut info = Map::new();
            info.insert("cond".into(), lower_expr(cond)?);
            info.insert(
                "body".into(),
                json!(tagged_block(body, &["do"], "while body must be (do ...)")?),
            );
            match rest {
                [] => {}
                [otherwise] => {
                    info.insert(
                        "else".into(),
                        json!(tagged_block(otherwise, &["else"], "while else must be (else ...)")?),
                    );
                }
                _ => return Err(node.error("while takes a body and an optional else")),
            }
            json!({ "while": info })
        }
        "break" => json!({ "break": true }),
        "continue" => json!({ "continue": true }),
        "raise" => match args {
            [] => json!({ "raise": null }),
            [value] => json!({ "raise": lower_expr(value)? }),
            _ => return Err(node.error("raise takes zero or one argument")),
        },
        "assert" => match args {
            [cond] => json!({ "assert": { "cond": lower_expr(cond)? } }),
            [cond, msg, ..] => json!({ "assert": { "cond": lower_expr(cond)?, "msg": lower_expr(msg)? } }),
            [] => return Err(node.error("assert requires condition")),
        },
        "with" => {
            let [items_node, body, ..] = args else {
                return Err(node.error("with requires items and body"));
            };
            let entries = items_node
                .as_list()
                .filter(|e| !e.is_empty())
                .ok_or_else(|| items_node.error("with items must be a list"))?;

            // ((ctx a) (ctx b)) lists several items; (ctx alias?) is a single one
            let all_lists = entries.iter().all(|e| e.as_list().is_some());
            let multiple = all_lists
                && (entries.len() > 1
                    || entries[0].as_list().and_then(|e| e.first()).is_some_and(|h| h.as_list().is_some()));
            let items = if multiple {
                entries.iter().map(lower_with_item).collect::<Result<Vec<_>>>()?
            } else {
                vec![lower_with_item(items_node)?]
            };
            json!({
                "with": {
                    "items": items,
                    "body": tagged_block(body, &["do"], "with body must be (do ...)")?,
                }
            })
        }
        _ => json!({ "expr": lower_expr(node)? }),
    };
    Ok(stmt)
}

fn lower_with_item(node: &Datum) -> Result<JsonValue> {
    match node.as_list() {
        Some([context]) => Ok(json!({ "context": lower_expr(context)? })),
        Some([context, alias, ..]) => Ok(json!({
            "context": lower_expr(context)?,
            "as": alias.symbol("with alias must be a symbol")?,
        })),
        _ => Err(node.error("with item must be (context var?)")),
    }
}

/* ===================== Expressions ===================== */

/// Surface spelling of binary operators; `not-in` stands for `not in`
fn binop_symbol(symbol: &str) -> Option<&'static str> {
    match symbol {
        "not-in" => Some(BinOp::NotIn.symbol()),
        other => BinOp::from_symbol(other).map(BinOp::symbol),
    }
}

fn lower_expr(node: &Datum) -> Result<JsonValue> {
    let items = match &node.kind {
        DatumKind::Symbol(name) => return Ok(json!({ "name": name })),
        DatumKind::List(items) => items,
        _ => return Ok(json!({ "literal": node.to_json() })),
    };
    let Some(head) = items.first() else {
        return Err(node.error("empty expression list"));
    };
    let args = &items[1..];

    let Some(keyword) = head.as_symbol() else {
        return lower_call(lower_expr(head)?, args);
    };

    if let Some(op) = binop_symbol(keyword) {
        let [left, right, rest @ ..] = args else {
            return Err(node.error(format!("operator {} requires operands", keyword)));
        };
        let mut expr = json!({ "binop": { "op": op, "left": lower_expr(left)?, "right": lower_expr(right)? } });
        for extra in rest {
            expr = json!({ "binop": { "op": op, "left": expr, "right": lower_expr(extra)? } });
        }
        return Ok(expr);
    }

    let expr = match keyword {
        "attr" => match args {
            [base, attr] => json!({
                "attr": { "base": lower_expr(base)?, "attr": attr.symbol("attribute name must be a symbol")? }
            }),
            _ => return Err(node.error("attr requires base and attr name")),
        },
        "index" => match args {
            [base, index] => json!({ "index": { "base": lower_expr(base)?, "index": lower_expr(index)? } }),
            _ => return Err(node.error("index requires base and index")),
        },
        "list" => json!({ "list": args.iter().map(lower_expr).collect::<Result<Vec<_>>>()? }),
        "tuple" => json!({ "tuple": args.iter().map(lower_expr).collect::<Result<Vec<_>>>()? }),
        "dict" => {
            let entries = args
                .iter()
                .map(|entry| {
                    let (key, value) = entry.pair("dict entries must be (key value)")?;
                    Ok(json!({ "key": lower_expr(key)?, "value": lower_expr(value)? }))
                })
                .collect::<Result<Vec<_>>>()?;
            json!({ "dict": entries })
        }
        "python" => match args {
            [Datum {
                kind: DatumKind::Str(source),
                ..
            }] => json!({ "python": source }),
            _ => return Err(node.error("python expression requires a string")),
        },
        "validate" => lower_validate(node, args)?,
        "parallel" => {
            let tasks = args
                .iter()
                .map(|task| {
                    let (name, call) = task.pair("parallel tasks must be (name expr)")?;
                    Ok(json!({
                        "name": name.symbol("parallel task name must be a symbol")?,
                        "call": lower_expr(call)?,
                    }))
                })
                .collect::<Result<Vec<_>>>()?;
            json!({ "parallel": tasks })
        }
        "call" => {
            let [func, rest @ ..] = args else {
                return Err(node.error("call requires function"));
            };
            lower_call(lower_expr(func)?, rest)?
        }
        name => lower_call(json!(name), args)?,
    };
    Ok(expr)
}

fn lower_call(callee: JsonValue, args: &[Datum]) -> Result<JsonValue> {
    let mut positional = Vec::new();
    let mut kwargs = Map::new();
    for arg in args {
        if arg.head() == Some("kw") {
            let Some([_, key, value]) = arg.as_list() else {
                return Err(arg.error("kw requires key and value"));
            };
            kwargs.insert(key.symbol("kw key must be a symbol")?.to_string(), lower_expr(value)?);
        } else {
            positional.push(lower_expr(arg)?);
        }
    }
    Ok(json!({ "call": callee, "args": positional, "kwargs": kwargs }))
}

fn lower_validate(node: &Datum, args: &[Datum]) -> Result<JsonValue> {
    // (validate schema data)
    if let [schema, data] = args {
        let keyed = |d: &Datum| matches!(d.head(), Some("schema" | "model" | "data"));
        if !(keyed(schema) && keyed(data)) {
            return Ok(json!({ "validate": { "schema": lower_expr(schema)?, "data": lower_expr(data)? } }));
        }
    }

    // (validate (schema X)|(model X) (data Y))
    let mut target = None;
    let mut data = None;
    for item in args {
        let (key, value) = item.pair("validate entries must be (schema X) or (data X)")?;
        match key.symbol("validate key must be a symbol")? {
            "schema" => target = Some(("schema", lower_expr(value)?)),
            "model" => target = Some(("model", lower_expr(value)?)),
            "data" => data = Some(lower_expr(value)?),
            other => return Err(key.error(format!("unknown validate key: {}", other))),
        }
    }
    let Some(data) = data else {
        return Err(node.error("validate requires data"));
    };
    let Some((kind, target)) = target else {
        return Err(node.error("validate requires schema or model"));
    };
    let mut info = Map::new();
    info.insert(kind.to_string(), target);
    info.insert("data".into(), data);
    Ok(json!({ "validate": info }))
}
