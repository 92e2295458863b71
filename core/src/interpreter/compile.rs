//! Compile listing
//!
//! Renders a program as Python-flavoured source that mirrors the IR one node
//! at a time: imports, input bindings, one decorated function per step and
//! the run entry. The listing is for reading and diffing; nothing executes
//! it.

use super::types::{
    Callee, Expr, Import, Program, Run, Step, StepBody, Stmt, ValidateTarget, WithItem,
};
use serde_json::Value as JsonValue;

const INDENT: usize = 4;

pub fn compile_program(program: &Program) -> String {
    let mut out = Listing::default();
    out.line(0, "from vibelang.runtime import step");
    out.line(0, "import vibelang.std as vbl");
    out.blank();

    for import in &program.imports {
        out.line(0, &render_import(import));
    }
    if !program.imports.is_empty() {
        out.blank();
    }

    for name in program.inputs.keys() {
        out.line(0, &format!("{} = __vbl_inputs__.get({})", name, py_str(name)));
    }
    if !program.inputs.is_empty() {
        out.blank();
    }

    for step in &program.steps {
        render_step(&mut out, step);
        out.blank();
    }

    match &program.run {
        Run::Expr(expr) => out.line(0, &format!("__vbl_result__ = {}", render_expr(expr))),
        Run::Block(body) => {
            out.line(0, "def __vbl_run__():");
            render_block(&mut out, body, INDENT);
            out.line(0, "__vbl_result__ = __vbl_run__()");
        }
        Run::Raw(lines) => {
            out.line(0, "__vbl_result__ = None");
            for line in lines {
                out.line(0, line);
            }
        }
    }

    out.finish()
}

#[derive(Default)]
struct Listing {
    lines: Vec<String>,
}

impl Listing {
    fn line(&mut self, indent: usize, text: &str) {
        self.lines.push(format!("{}{}", " ".repeat(indent), text));
    }

    fn blank(&mut self) {
        self.lines.push(String::new());
    }

    fn finish(self) -> String {
        let mut text = self.lines.join("\n").trim_end().to_string();
        text.push('\n');
        text
    }
}

/* ===================== Program Parts ===================== */

fn render_import(import: &Import) -> String {
    match import {
        Import::Module {
            module,
            alias: Some(alias),
        } => format!("import {} as {}", module, alias),
        Import::Module { module, alias: None } => format!("import {}", module),
        Import::From { module, names } => format!("from {} import {}", module, names.join(", ")),
    }
}

fn render_step(out: &mut Listing, step: &Step) {
    let mut options = Vec::new();
    if step.retry > 0 {
        options.push(format!("retry={}", step.retry));
    }
    if let Some(timeout) = step.timeout {
        options.push(format!("timeout={}", py_float(timeout)));
    }
    if !step.guard.is_empty() {
        let tokens: Vec<String> = step.guard.iter().map(|t| py_str(t)).collect();
        options.push(format!("guard=[{}]", tokens.join(", ")));
    }
    if let Some(produces) = &step.produces {
        options.push(format!("produces={}", py_str(produces)));
    }

    out.line(0, &format!("@step({})", options.join(", ")));
    out.line(0, &format!("def {}({}):", step.name, step.params.join(", ")));
    match &step.body {
        StepBody::Return(expr) => out.line(INDENT, &format!("return {}", render_expr(expr))),
        StepBody::Block(body) => render_block(out, body, INDENT),
        StepBody::Raw(lines) if lines.is_empty() => out.line(INDENT, "pass"),
        StepBody::Raw(lines) => {
            for line in lines {
                out.line(INDENT, line);
            }
        }
    }
}

/* ===================== Statements ===================== */

fn render_block(out: &mut Listing, stmts: &[Stmt], indent: usize) {
    if stmts.is_empty() {
        out.line(indent, "pass");
    }
    for stmt in stmts {
        render_stmt(out, stmt, indent);
    }
}

fn render_stmt(out: &mut Listing, stmt: &Stmt, indent: usize) {
    match stmt {
        Stmt::Set { name, value } => out.line(indent, &format!("{} = {}", name, render_expr(value))),
        Stmt::Expr(expr) => out.line(indent, &render_expr(expr)),
        Stmt::Return(expr) => out.line(indent, &format!("return {}", render_expr(expr))),
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            out.line(indent, &format!("if {}:", render_expr(cond)));
            render_block(out, then, indent + INDENT);
            if !otherwise.is_empty() {
                out.line(indent, "else:");
                render_block(out, otherwise, indent + INDENT);
            }
        }
        Stmt::For { var, iter, body } => {
            out.line(indent, &format!("for {} in {}:", var, render_expr(iter)));
            render_block(out, body, indent + INDENT);
        }
        Stmt::While {
            cond,
            body,
            otherwise,
        } => {
            out.line(indent, &format!("while {}:", render_expr(cond)));
            render_block(out, body, indent + INDENT);
            if !otherwise.is_empty() {
                out.line(indent, "else:");
                render_block(out, otherwise, indent + INDENT);
            }
        }
        Stmt::Break => out.line(indent, "break"),
        Stmt::Continue => out.line(indent, "continue"),
        Stmt::With { items, body } => {
            let items: Vec<String> = items.iter().map(render_with_item).collect();
            out.line(indent, &format!("with {}:", items.join(", ")));
            render_block(out, body, indent + INDENT);
        }
        Stmt::Assert { cond, msg } => match msg {
            Some(msg) => out.line(
                indent,
                &format!("assert {}, {}", render_expr(cond), render_expr(msg)),
            ),
            None => out.line(indent, &format!("assert {}", render_expr(cond))),
        },
        Stmt::Raise(None) => out.line(indent, "raise"),
        Stmt::Raise(Some(value)) => out.line(indent, &format!("raise {}", render_expr(value))),
        Stmt::Raw(lines) => {
            for line in lines {
                out.line(indent, line);
            }
        }
    }
}

fn render_with_item(item: &WithItem) -> String {
    match &item.alias {
        Some(alias) => format!("{} as {}", render_expr(&item.context), alias),
        None => render_expr(&item.context),
    }
}

/* ===================== Expressions ===================== */

pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Name(name) => name.clone(),
        Expr::Literal(value) => py_literal(value),
        Expr::Raw(source) => source.clone(),
        Expr::Call {
            callee,
            args,
            kwargs,
        } => {
            let callee = match callee {
                Callee::Name(name) => name.clone(),
                Callee::Expr(expr) => render_expr(expr),
            };
            let parts: Vec<String> = args
                .iter()
                .map(render_expr)
                .chain(kwargs.iter().map(|(k, v)| format!("{}={}", k, render_expr(v))))
                .collect();
            format!("{}({})", callee, parts.join(", "))
        }
        Expr::Attr { base, attr } => format!("{}.{}", render_expr(base), attr),
        Expr::Index { base, index } => format!("{}[{}]", render_expr(base), render_expr(index)),
        Expr::List(items) => format!("[{}]", render_all(items)),
        Expr::Tuple(items) if items.len() == 1 => format!("({},)", render_all(items)),
        Expr::Tuple(items) => format!("({})", render_all(items)),
        Expr::Dict(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", render_expr(k), render_expr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Expr::BinOp { op, left, right } => {
            format!("({} {} {})", render_expr(left), op.symbol(), render_expr(right))
        }
        Expr::Validate { target, data } => match target {
            ValidateTarget::Schema(schema) => format!(
                "vbl.validate_schema({}, {})",
                render_expr(data),
                render_expr(schema)
            ),
            ValidateTarget::Model(model) => format!(
                "vbl.validate_model({}, {})",
                render_expr(model),
                render_expr(data)
            ),
        },
        Expr::Parallel(tasks) => {
            let parts: Vec<String> = tasks
                .iter()
                .map(|t| format!("{}: (lambda: {})", py_str(&t.name), render_expr(&t.call)))
                .collect();
            format!("vbl.parallel({{{}}})", parts.join(", "))
        }
    }
}

fn render_all(items: &[Expr]) -> String {
    items.iter().map(render_expr).collect::<Vec<_>>().join(", ")
}

/* ===================== Literals ===================== */

fn py_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "None".to_string(),
        JsonValue::Bool(true) => "True".to_string(),
        JsonValue::Bool(false) => "False".to_string(),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if n.is_f64() => py_float(f),
            _ => n.to_string(),
        },
        JsonValue::String(s) => py_str(s),
        JsonValue::Array(items) => {
            let parts: Vec<String> = items.iter().map(py_literal).collect();
            format!("[{}]", parts.join(", "))
        }
        JsonValue::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", py_str(k), py_literal(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

fn py_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::parser::parse_program;

    fn compile(source: &str) -> String {
        compile_program(&parse_program(source).expect("Should parse"))
    }

    #[test]
    fn test_echo_listing() {
        let listing = compile(
            r#"
            (import json)
            (input message "hello")
            (step shout (params text) (retry 2) (timeout 1.5) (guard "OFF") (return (text.upper)))
            (run (shout message))
            "#,
        );

        let expected = "\
from vibelang.runtime import step
import vibelang.std as vbl

import json

message = __vbl_inputs__.get('message')

@step(retry=2, timeout=1.5, guard=['OFF'])
def shout(text):
    return text.upper()

__vbl_result__ = shout(message)
";
        assert_eq!(listing, expected);
    }

    #[test]
    fn test_block_statements() {
        let listing = compile(
            r#"
            (run (block
              (set n 0)
              (while (< n 3) (do (set n (+ n 1))) (else (print "done")))
              (with ((vbl.span "s") sp) (do (assert (> n 0) "positive")))
              (if n (then (return (list n null true))))))
            "#,
        );

        let expected = "\
from vibelang.runtime import step
import vibelang.std as vbl

def __vbl_run__():
    n = 0
    while (n < 3):
        n = (n + 1)
    else:
        print('done')
    with vbl.span('s') as sp:
        assert (n > 0), 'positive'
    if n:
        return [n, None, True]
__vbl_result__ = __vbl_run__()
";
        assert_eq!(listing, expected);
    }

    #[test]
    fn test_literals() {
        assert_eq!(py_literal(&serde_json::json!({ "a": [1, 2.0, "it's"] })), r#"{'a': [1, 2.0, 'it\'s']}"#);
        assert_eq!(render_expr(&Expr::Tuple(vec![Expr::literal(1)])), "(1,)");
    }
}
