//! Canonical JSON IR encoding
//!
//! Output key order is fixed so that `vibelang parse` is diff-stable.

use crate::interpreter::types::{
    Callee, Expr, Import, Program, Run, Step, StepBody, Stmt, ValidateTarget,
};
use serde_json::{json, Map, Value as JsonValue};

pub fn encode(program: &Program) -> JsonValue {
    let meta: Map<String, JsonValue> = program
        .meta
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let inputs: Map<String, JsonValue> = program
        .inputs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    json!({
        "meta": meta,
        "imports": program.imports.iter().map(encode_import).collect::<Vec<_>>(),
        "inputs": inputs,
        "steps": program.steps.iter().map(encode_step).collect::<Vec<_>>(),
        "run": encode_run(&program.run),
    })
}

fn encode_import(import: &Import) -> JsonValue {
    match import {
        Import::Module {
            module,
            alias: None,
        } => JsonValue::String(module.clone()),
        Import::Module {
            module,
            alias: Some(alias),
        } => json!({ "import": module, "as": alias }),
        Import::From { module, names } => json!({ "from": module, "import": names }),
    }
}

fn encode_step(step: &Step) -> JsonValue {
    let mut out = Map::new();
    out.insert("name".into(), json!(step.name));
    out.insert("params".into(), json!(step.params));
    if step.retry > 0 {
        out.insert("retry".into(), json!(step.retry));
    }
    if let Some(timeout) = step.timeout {
        out.insert("timeout".into(), seconds(timeout));
    }
    if !step.guard.is_empty() {
        out.insert("guard".into(), json!(step.guard));
    }
    if let Some(produces) = &step.produces {
        out.insert("produces".into(), json!(produces));
    }
    match &step.body {
        StepBody::Block(stmts) => {
            out.insert("body".into(), json!({ "block": encode_block(stmts) }));
        }
        StepBody::Raw(lines) => {
            out.insert("body".into(), json!(lines));
        }
        StepBody::Return(expr) => {
            out.insert("return".into(), encode_expr(expr));
        }
    }
    JsonValue::Object(out)
}

/// Whole seconds encode as integers
fn seconds(value: f64) -> JsonValue {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

fn encode_run(run: &Run) -> JsonValue {
    match run {
        Run::Expr(expr) => encode_expr(expr),
        Run::Block(stmts) => json!({ "block": encode_block(stmts) }),
        Run::Raw(lines) => json!({ "python": lines }),
    }
}

pub fn encode_block(stmts: &[Stmt]) -> Vec<JsonValue> {
    stmts.iter().map(encode_stmt).collect()
}

pub fn encode_stmt(stmt: &Stmt) -> JsonValue {
    match stmt {
        Stmt::Set { name, value } => json!({ "set": { "name": name, "value": encode_expr(value) } }),
        Stmt::Expr(expr) => json!({ "expr": encode_expr(expr) }),
        Stmt::Return(expr) => json!({ "return": encode_expr(expr) }),
        Stmt::If {
            cond,
            then,
            otherwise,
        } => json!({
            "if": {
                "cond": encode_expr(cond),
                "then": encode_block(then),
                "else": encode_block(otherwise),
            }
        }),
        Stmt::For { var, iter, body } => json!({
            "for": { "var": var, "iter": encode_expr(iter), "body": encode_block(body) }
        }),
        Stmt::While {
            cond,
            body,
            otherwise,
        } => {
            let mut info = Map::new();
            info.insert("cond".into(), encode_expr(cond));
            info.insert("body".into(), json!(encode_block(body)));
            if !otherwise.is_empty() {
                info.insert("else".into(), json!(encode_block(otherwise)));
            }
            json!({ "while": info })
        }
        Stmt::Break => json!({ "break": true }),
        Stmt::Continue => json!({ "continue": true }),
        Stmt::With { items, body } => {
            let items: Vec<JsonValue> = items
                .iter()
                .map(|item| match &item.alias {
                    Some(alias) => json!({ "context": encode_expr(&item.context), "as": alias }),
                    None => json!({ "context": encode_expr(&item.context) }),
                })
                .collect();
            json!({ "with": { "items": items, "body": encode_block(body) } })
        }
        Stmt::Assert { cond, msg } => match msg {
            Some(msg) => json!({ "assert": { "cond": encode_expr(cond), "msg": encode_expr(msg) } }),
            None => json!({ "assert": { "cond": encode_expr(cond) } }),
        },
        Stmt::Raise(value) => json!({ "raise": value.as_ref().map(encode_expr) }),
        Stmt::Raw(lines) => json!({ "python": lines }),
    }
}

pub fn encode_expr(expr: &Expr) -> JsonValue {
    match expr {
        Expr::Name(name) => json!({ "name": name }),
        Expr::Literal(value) => json!({ "literal": value }),
        Expr::Raw(source) => json!({ "python": source }),
        Expr::Call {
            callee,
            args,
            kwargs,
        } => {
            let callee = match callee {
                Callee::Name(name) => JsonValue::String(name.clone()),
                Callee::Expr(expr) => encode_expr(expr),
            };
            let kwargs: Map<String, JsonValue> = kwargs
                .iter()
                .map(|(k, v)| (k.clone(), encode_expr(v)))
                .collect();
            json!({
                "call": callee,
                "args": args.iter().map(encode_expr).collect::<Vec<_>>(),
                "kwargs": kwargs,
            })
        }
        Expr::Attr { base, attr } => json!({ "attr": { "base": encode_expr(base), "attr": attr } }),
        Expr::Index { base, index } => json!({
            "index": { "base": encode_expr(base), "index": encode_expr(index) }
        }),
        Expr::List(items) => json!({ "list": items.iter().map(encode_expr).collect::<Vec<_>>() }),
        Expr::Tuple(items) => json!({ "tuple": items.iter().map(encode_expr).collect::<Vec<_>>() }),
        Expr::Dict(entries) => {
            let entries: Vec<JsonValue> = entries
                .iter()
                .map(|(k, v)| json!({ "key": encode_expr(k), "value": encode_expr(v) }))
                .collect();
            json!({ "dict": entries })
        }
        Expr::BinOp { op, left, right } => json!({
            "binop": { "op": op.symbol(), "left": encode_expr(left), "right": encode_expr(right) }
        }),
        Expr::Validate { target, data } => match target {
            ValidateTarget::Schema(schema) => json!({
                "validate": { "schema": encode_expr(schema), "data": encode_expr(data) }
            }),
            ValidateTarget::Model(model) => json!({
                "validate": { "model": encode_expr(model), "data": encode_expr(data) }
            }),
        },
        Expr::Parallel(tasks) => {
            let tasks: Vec<JsonValue> = tasks
                .iter()
                .map(|t| json!({ "name": t.name, "call": encode_expr(&t.call) }))
                .collect();
            json!({ "parallel": tasks })
        }
    }
}
