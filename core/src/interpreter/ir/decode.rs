//! JSON IR decoding
//!
//! The decoder never stops at the first problem: every shape error is
//! recorded with a JSON path so `MalformedIR` can list all of them at once.

use super::is_identifier;
use crate::interpreter::types::{
    BinOp, Callee, Expr, Import, ParallelTask, Program, Run, Step, StepBody, Stmt,
    ValidateTarget, WithItem,
};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

const PROGRAM_KEYS: [&str; 5] = ["meta", "imports", "inputs", "steps", "run"];

const STEP_KEYS: [&str; 8] = [
    "name", "params", "retry", "timeout", "guard", "produces", "body", "return",
];

const EXPR_KEYS: [&str; 12] = [
    "name", "literal", "python", "call", "attr", "index", "list", "tuple", "dict", "binop",
    "validate", "parallel",
];

const STMT_KEYS: [&str; 12] = [
    "set", "expr", "return", "if", "for", "while", "break", "continue", "with", "assert",
    "raise", "python",
];

#[derive(Default)]
pub(crate) struct Decoder {
    pub issues: Vec<String>,
}

impl Decoder {
    fn issue(&mut self, path: &str, message: impl fmt::Display) {
        self.issues.push(format!("{}: {}", path, message));
    }

    /* ===================== Program ===================== */

    pub fn program(&mut self, doc: &JsonValue) -> Option<Program> {
        let Some(obj) = doc.as_object() else {
            self.issue("$", "top-level IR must be an object");
            return None;
        };

        for key in obj.keys() {
            if !PROGRAM_KEYS.contains(&key.as_str()) {
                self.issue("$", format!("unknown top-level key '{}'", key));
            }
        }

        let meta = self.object_map(obj.get("meta"), "$.meta");
        let inputs = self.object_map(obj.get("inputs"), "$.inputs");

        let imports = match obj.get("imports") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| self.import(item, &format!("$.imports[{}]", i)))
                .collect(),
            Some(_) => {
                self.issue("$.imports", "must be a list");
                Vec::new()
            }
        };

        let steps = match obj.get("steps") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| self.step(item, &format!("$.steps[{}]", i)))
                .collect(),
            Some(_) => {
                self.issue("$.steps", "must be a list");
                Vec::new()
            }
        };

        let run = match obj.get("run") {
            None | Some(JsonValue::Null) => {
                self.issue("$.run", "IR must include a 'run' entry");
                Run::Expr(Expr::Literal(JsonValue::Null))
            }
            Some(value) => self.run(value, "$.run"),
        };

        Some(Program {
            meta,
            imports,
            inputs,
            steps,
            run,
        })
    }

    fn object_map(&mut self, value: Option<&JsonValue>, path: &str) -> IndexMap<String, JsonValue> {
        match value {
            None | Some(JsonValue::Null) => IndexMap::new(),
            Some(JsonValue::Object(map)) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            Some(_) => {
                self.issue(path, "must be an object");
                IndexMap::new()
            }
        }
    }

    fn import(&mut self, value: &JsonValue, path: &str) -> Option<Import> {
        match value {
            JsonValue::String(module) => Some(Import::Module {
                module: module.clone(),
                alias: None,
            }),
            JsonValue::Object(obj) if obj.contains_key("from") => {
                let module = self.string(obj.get("from"), &format!("{}.from", path))?;
                let names = match obj.get("import") {
                    Some(JsonValue::String(name)) => vec![name.clone()],
                    other => self.string_list(other, &format!("{}.import", path))?,
                };
                Some(Import::From { module, names })
            }
            JsonValue::Object(obj) if obj.contains_key("import") => {
                let module = self.string(obj.get("import"), &format!("{}.import", path))?;
                let alias = match obj.get("as") {
                    None | Some(JsonValue::Null) => None,
                    other => Some(self.string(other, &format!("{}.as", path))?),
                };
                Some(Import::Module { module, alias })
            }
            _ => {
                self.issue(path, "import must be a string or an object with 'import' or 'from'");
                None
            }
        }
    }

    /* ===================== Steps ===================== */

    fn step(&mut self, value: &JsonValue, path: &str) -> Option<Step> {
        let Some(obj) = value.as_object() else {
            self.issue(path, "step must be an object");
            return None;
        };

        for key in obj.keys() {
            if !STEP_KEYS.contains(&key.as_str()) {
                self.issue(path, format!("unknown step key '{}'", key));
            }
        }

        let name = self.string(obj.get("name"), &format!("{}.name", path))?;
        let path = format!("$.steps[{}]", name);

        let params = match obj.get("params") {
            None | Some(JsonValue::Null) => Vec::new(),
            other => self
                .string_list(other, &format!("{}.params", path))
                .unwrap_or_default(),
        };

        let retry = match obj.get("retry") {
            None | Some(JsonValue::Null) => 0,
            Some(v) => match v.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => n,
                None => {
                    self.issue(
                        &format!("{}.retry", path),
                        "retry must be a non-negative integer",
                    );
                    0
                }
            },
        };

        let timeout = match obj.get("timeout") {
            None | Some(JsonValue::Null) => None,
            Some(v) => match v.as_f64() {
                Some(seconds) => Some(seconds),
                None => {
                    self.issue(&format!("{}.timeout", path), "timeout must be a number of seconds");
                    None
                }
            },
        };

        let guard = match obj.get("guard") {
            None | Some(JsonValue::Null) => Vec::new(),
            other => self
                .string_list(other, &format!("{}.guard", path))
                .unwrap_or_default(),
        };

        let produces = match obj.get("produces") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(tag)) => Some(tag.clone()),
            Some(other) => Some(other.to_string()),
        };

        let body = match (obj.get("body"), obj.get("return")) {
            (Some(body), None) => self.step_body(body, &format!("{}.body", path)),
            (None, Some(ret)) => StepBody::Return(self.expr(ret, &format!("{}.return", path))),
            (Some(_), Some(_)) => {
                self.issue(&path, format!("step '{}' must not define both 'body' and 'return'", name));
                return None;
            }
            (None, None) => {
                self.issue(&path, format!("step '{}' must include 'body' or 'return'", name));
                return None;
            }
        };

        Some(Step {
            name,
            params,
            retry,
            timeout,
            guard,
            produces,
            body,
        })
    }

    fn step_body(&mut self, value: &JsonValue, path: &str) -> StepBody {
        match value {
            JsonValue::String(source) => StepBody::Raw(split_lines(source)),
            JsonValue::Array(items) if items.iter().all(JsonValue::is_string) && !items.is_empty() => {
                StepBody::Raw(self.raw_lines(value, path))
            }
            JsonValue::Array(_) => StepBody::Block(self.block(Some(value), path)),
            JsonValue::Object(obj) if obj.contains_key("block") => {
                StepBody::Block(self.block(obj.get("block"), &format!("{}.block", path)))
            }
            JsonValue::Object(obj) if obj.contains_key("python") => {
                StepBody::Raw(self.raw_lines(&obj["python"], &format!("{}.python", path)))
            }
            _ => {
                self.issue(path, "body must be a string, a list of strings, or a block");
                StepBody::Block(Vec::new())
            }
        }
    }

    fn run(&mut self, value: &JsonValue, path: &str) -> Run {
        match value {
            JsonValue::Object(obj) if obj.len() == 1 && obj.contains_key("block") => {
                Run::Block(self.block(obj.get("block"), &format!("{}.block", path)))
            }
            JsonValue::Object(obj) if obj.len() == 1 && matches!(obj.get("python"), Some(JsonValue::Array(_))) => {
                Run::Raw(self.raw_lines(&obj["python"], &format!("{}.python", path)))
            }
            other => Run::Expr(self.expr(other, path)),
        }
    }

    /* ===================== Statements ===================== */

    fn block(&mut self, value: Option<&JsonValue>, path: &str) -> Vec<Stmt> {
        match value {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| self.stmt(item, &format!("{}[{}]", path, i)))
                .collect(),
            Some(_) => {
                self.issue(path, "block must be a list of statements");
                Vec::new()
            }
        }
    }

    fn stmt(&mut self, value: &JsonValue, path: &str) -> Option<Stmt> {
        let obj = match value {
            JsonValue::String(line) => return Some(Stmt::Raw(split_lines(line))),
            JsonValue::Object(obj) => obj,
            _ => {
                self.issue(path, "statement must be an object");
                return None;
            }
        };

        let Some(kind) = STMT_KEYS.iter().find(|k| obj.contains_key(**k)) else {
            self.issue(path, "unknown statement type");
            return None;
        };
        let node = &obj[*kind];
        let path = format!("{}.{}", path, kind);

        let stmt = match *kind {
            "set" => {
                let info = self.fields(node, &path)?;
                Stmt::Set {
                    name: self.string(info.get("name"), &format!("{}.name", path))?,
                    value: self.required_expr(info, "value", &path),
                }
            }
            "expr" => Stmt::Expr(self.expr(node, &path)),
            "return" => Stmt::Return(self.expr(node, &path)),
            "if" => {
                let info = self.fields(node, &path)?;
                if !info.contains_key("then") {
                    self.issue(&path, "'if' requires cond and then");
                }
                Stmt::If {
                    cond: self.required_expr(info, "cond", &path),
                    then: self.block(info.get("then"), &format!("{}.then", path)),
                    otherwise: self.block(info.get("else"), &format!("{}.else", path)),
                }
            }
            "for" => {
                let info = self.fields(node, &path)?;
                Stmt::For {
                    var: self.string(info.get("var"), &format!("{}.var", path))?,
                    iter: self.required_expr(info, "iter", &path),
                    body: self.required_block(info, "body", &path),
                }
            }
            "while" => {
                let info = self.fields(node, &path)?;
                Stmt::While {
                    cond: self.required_expr(info, "cond", &path),
                    body: self.required_block(info, "body", &path),
                    otherwise: self.block(info.get("else"), &format!("{}.else", path)),
                }
            }
            "break" => Stmt::Break,
            "continue" => Stmt::Continue,
            "with" => {
                let info = self.fields(node, &path)?;
                let items = match info.get("items") {
                    Some(JsonValue::Array(items)) if !items.is_empty() => items
                        .iter()
                        .enumerate()
                        .filter_map(|(i, item)| self.with_item(item, &format!("{}.items[{}]", path, i)))
                        .collect(),
                    _ => {
                        self.issue(&path, "'with' requires a non-empty items list");
                        Vec::new()
                    }
                };
                Stmt::With {
                    items,
                    body: self.required_block(info, "body", &path),
                }
            }
            "assert" => {
                let info = self.fields(node, &path)?;
                Stmt::Assert {
                    cond: self.required_expr(info, "cond", &path),
                    msg: match info.get("msg") {
                        None | Some(JsonValue::Null) => None,
                        Some(msg) => Some(self.expr(msg, &format!("{}.msg", path))),
                    },
                }
            }
            "raise" => match node {
                JsonValue::Null => Stmt::Raise(None),
                value => Stmt::Raise(Some(self.expr(value, &path))),
            },
            "python" => Stmt::Raw(self.raw_lines(node, &path)),
            _ => unreachable!("statement keys are exhaustive"),
        };
        Some(stmt)
    }

    fn with_item(&mut self, value: &JsonValue, path: &str) -> Option<WithItem> {
        let info = self.fields(value, path)?;
        let Some(context) = info.get("context") else {
            self.issue(path, "'with' item requires context");
            return None;
        };
        let alias = match info.get("as") {
            None | Some(JsonValue::Null) => None,
            other => Some(self.string(other, &format!("{}.as", path))?),
        };
        Some(WithItem {
            context: self.expr(context, &format!("{}.context", path)),
            alias,
        })
    }

    /* ===================== Expressions ===================== */

    pub fn expr(&mut self, value: &JsonValue, path: &str) -> Expr {
        let obj = match value {
            JsonValue::Null | JsonValue::Bool(_) | JsonValue::Number(_) => {
                return Expr::Literal(value.clone())
            }
            JsonValue::String(source) => return bare_string(source),
            JsonValue::Array(_) => {
                self.issue(path, "lists are not expressions; use {\"list\": [...]}");
                return Expr::Literal(JsonValue::Null);
            }
            JsonValue::Object(obj) => obj,
        };

        let Some(kind) = EXPR_KEYS.iter().find(|k| obj.contains_key(**k)) else {
            self.issue(path, "unknown expression node");
            return Expr::Literal(JsonValue::Null);
        };
        let node = &obj[*kind];
        let path = format!("{}.{}", path, kind);

        match *kind {
            "name" => match node.as_str() {
                Some(name) => Expr::Name(name.to_string()),
                None => {
                    self.issue(&path, "name must be a string");
                    Expr::Literal(JsonValue::Null)
                }
            },
            "literal" => Expr::Literal(node.clone()),
            "python" => match node.as_str() {
                Some(source) => Expr::Raw(source.to_string()),
                None => {
                    self.issue(&path, "python expression must be a string");
                    Expr::Literal(JsonValue::Null)
                }
            },
            "call" => self.call(node, obj, &path),
            "attr" => {
                let Some(info) = self.fields(node, &path) else {
                    return Expr::Literal(JsonValue::Null);
                };
                let base = info.get("base").or_else(|| info.get("object"));
                let base = match base {
                    Some(base) => self.expr(base, &format!("{}.base", path)),
                    None => {
                        self.issue(&path, "'attr' requires base");
                        Expr::Literal(JsonValue::Null)
                    }
                };
                let attr = self
                    .string(info.get("attr"), &format!("{}.attr", path))
                    .unwrap_or_default();
                Expr::Attr {
                    base: Box::new(base),
                    attr,
                }
            }
            "index" => {
                let Some(info) = self.fields(node, &path) else {
                    return Expr::Literal(JsonValue::Null);
                };
                Expr::Index {
                    base: Box::new(self.required_expr(info, "base", &path)),
                    index: Box::new(self.required_expr(info, "index", &path)),
                }
            }
            "list" => Expr::List(self.expr_list(node, &path)),
            "tuple" => Expr::Tuple(self.expr_list(node, &path)),
            "dict" => Expr::Dict(self.dict_entries(node, &path)),
            "binop" => {
                let Some(info) = self.fields(node, &path) else {
                    return Expr::Literal(JsonValue::Null);
                };
                let op = match info.get("op").and_then(JsonValue::as_str) {
                    Some(symbol) => match BinOp::from_symbol(symbol) {
                        Some(op) => op,
                        None => {
                            self.issue(&path, format!("unknown operator '{}'", symbol));
                            BinOp::Add
                        }
                    },
                    None => {
                        self.issue(&path, "'binop' requires op");
                        BinOp::Add
                    }
                };
                Expr::BinOp {
                    op,
                    left: Box::new(self.required_expr(info, "left", &path)),
                    right: Box::new(self.required_expr(info, "right", &path)),
                }
            }
            "validate" => {
                let Some(info) = self.fields(node, &path) else {
                    return Expr::Literal(JsonValue::Null);
                };
                let target = match (info.get("schema"), info.get("model")) {
                    (Some(schema), None) => {
                        ValidateTarget::Schema(Box::new(self.expr(schema, &format!("{}.schema", path))))
                    }
                    (None, Some(model)) => {
                        ValidateTarget::Model(Box::new(self.expr(model, &format!("{}.model", path))))
                    }
                    _ => {
                        self.issue(&path, "'validate' requires exactly one of schema or model");
                        ValidateTarget::Schema(Box::new(Expr::Literal(JsonValue::Null)))
                    }
                };
                Expr::Validate {
                    target,
                    data: Box::new(self.required_expr(info, "data", &path)),
                }
            }
            "parallel" => {
                let JsonValue::Array(items) = node else {
                    self.issue(&path, "'parallel' must be a list");
                    return Expr::Parallel(Vec::new());
                };
                let mut tasks = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, i);
                    let Some(info) = self.fields(item, &item_path) else {
                        continue;
                    };
                    let Some(name) = self.string(info.get("name"), &format!("{}.name", item_path)) else {
                        continue;
                    };
                    let call = self.required_expr(info, "call", &item_path);
                    tasks.push(ParallelTask { name, call });
                }
                Expr::Parallel(tasks)
            }
            _ => unreachable!("expression keys are exhaustive"),
        }
    }

    fn call(&mut self, node: &JsonValue, obj: &Map<String, JsonValue>, path: &str) -> Expr {
        let callee = match node {
            JsonValue::String(name) if is_identifier(name) => Callee::Name(name.clone()),
            JsonValue::String(source) => Callee::Expr(Box::new(bare_string(source))),
            JsonValue::Object(_) => Callee::Expr(Box::new(self.expr(node, path))),
            _ => {
                self.issue(path, "callee must be a name or an expression");
                Callee::Name(String::new())
            }
        };

        let args = match obj.get("args") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(value) => self.expr_list(value, &format!("{}.args", path)),
        };

        let kwargs = match obj.get("kwargs") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), self.expr(v, &format!("{}.kwargs.{}", path, k))))
                .collect(),
            Some(_) => {
                self.issue(&format!("{}.kwargs", path), "kwargs must be an object");
                Vec::new()
            }
        };

        Expr::Call {
            callee,
            args,
            kwargs,
        }
    }

    fn expr_list(&mut self, value: &JsonValue, path: &str) -> Vec<Expr> {
        match value {
            JsonValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.expr(item, &format!("{}[{}]", path, i)))
                .collect(),
            _ => {
                self.issue(path, "must be a list");
                Vec::new()
            }
        }
    }

    fn dict_entries(&mut self, value: &JsonValue, path: &str) -> Vec<(Expr, Expr)> {
        match value {
            JsonValue::Object(map) => map
                .iter()
                .map(|(k, v)| {
                    (
                        Expr::Literal(JsonValue::String(k.clone())),
                        self.expr(v, &format!("{}.{}", path, k)),
                    )
                })
                .collect(),
            JsonValue::Array(items) => {
                let mut entries = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}[{}]", path, i);
                    match item.as_object() {
                        Some(info) if info.contains_key("key") && info.contains_key("value") => {
                            entries.push((
                                self.expr(&info["key"], &format!("{}.key", item_path)),
                                self.expr(&info["value"], &format!("{}.value", item_path)),
                            ));
                        }
                        _ => self.issue(&item_path, "dict entries must be objects with key and value"),
                    }
                }
                entries
            }
            _ => {
                self.issue(path, "'dict' must be a list or an object");
                Vec::new()
            }
        }
    }

    /* ===================== Helpers ===================== */

    fn fields<'v>(&mut self, value: &'v JsonValue, path: &str) -> Option<&'v Map<String, JsonValue>> {
        match value.as_object() {
            Some(map) => Some(map),
            None => {
                self.issue(path, "must be an object");
                None
            }
        }
    }

    fn required_expr(&mut self, info: &Map<String, JsonValue>, key: &str, path: &str) -> Expr {
        match info.get(key) {
            Some(value) => self.expr(value, &format!("{}.{}", path, key)),
            None => {
                self.issue(path, format!("missing '{}'", key));
                Expr::Literal(JsonValue::Null)
            }
        }
    }

    fn required_block(&mut self, info: &Map<String, JsonValue>, key: &str, path: &str) -> Vec<Stmt> {
        if !info.contains_key(key) {
            self.issue(path, format!("missing '{}'", key));
        }
        self.block(info.get(key), &format!("{}.{}", path, key))
    }

    fn string(&mut self, value: Option<&JsonValue>, path: &str) -> Option<String> {
        match value {
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(_) => {
                self.issue(path, "must be a string");
                None
            }
            None => {
                self.issue(path, "is required");
                None
            }
        }
    }

    fn string_list(&mut self, value: Option<&JsonValue>, path: &str) -> Option<Vec<String>> {
        match value {
            Some(JsonValue::Array(items)) if items.iter().all(JsonValue::is_string) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => {
                self.issue(path, "must be a list of strings");
                None
            }
        }
    }

    fn raw_lines(&mut self, value: &JsonValue, path: &str) -> Vec<String> {
        match value {
            JsonValue::String(source) => split_lines(source),
            JsonValue::Array(_) => self.string_list(Some(value), path).unwrap_or_default(),
            _ => {
                self.issue(path, "raw source must be a string or a list of strings");
                Vec::new()
            }
        }
    }
}

/// A bare string is a name, a dotted attribute chain, or raw source
fn bare_string(source: &str) -> Expr {
    if is_identifier(source) {
        return Expr::Name(source.to_string());
    }
    let mut parts = source.split('.');
    if source.split('.').all(is_identifier) {
        if let Some(first) = parts.next() {
            return parts.fold(Expr::Name(first.to_string()), |base, attr| Expr::Attr {
                base: Box::new(base),
                attr: attr.to_string(),
            });
        }
    }
    Expr::Raw(source.to_string())
}

fn split_lines(source: &str) -> Vec<String> {
    source.lines().map(str::to_string).collect()
}
