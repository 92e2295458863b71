//! Name binding
//!
//! Checks the structural invariants of programs built in code, resolves
//! imports, registers one shared handle per step and checks that every
//! bare-name callee can be resolved before anything runs. Name problems are
//! collected and reported together as a single `BindError`.

use super::errors::{Error, Result};
use super::host::Services;
use super::ir;
use super::stdlib;
use super::types::{Callable, Callee, Expr, Import, Module, Program, Run, Step, StepBody, Stmt, Val};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Program ready for evaluation
#[derive(Debug, Clone)]
pub struct BoundProgram {
    pub program: Program,
    /// One handle per step, shared by every call site
    pub steps: IndexMap<String, Arc<Step>>,
    /// `vbl` plus every import binding
    pub globals: IndexMap<String, Val>,
}

impl BoundProgram {
    pub fn step(&self, name: &str) -> Option<&Arc<Step>> {
        self.steps.get(name)
    }
}

/// Validate a program's structure, then resolve its names
pub fn bind(program: &Program, services: &Services) -> Result<BoundProgram> {
    ir::validate(program)?;

    let mut errors = Vec::new();

    let mut globals = IndexMap::new();
    if let Some(vbl) = stdlib::native_module("vbl") {
        globals.insert("vbl".to_string(), Val::Module(Arc::new(vbl)));
    }
    for import in &program.imports {
        if let Err(e) = bind_import(import, services, &mut globals) {
            errors.push(e);
        }
    }

    let steps: IndexMap<String, Arc<Step>> = program
        .steps
        .iter()
        .map(|s| (s.name.clone(), Arc::new(s.clone())))
        .collect();

    let resolver = Resolver {
        program,
        steps: &steps,
        globals: &globals,
        services,
    };

    for step in &program.steps {
        let label = format!("step '{}'", step.name);
        let mut scope = Scope::new(&resolver, &label, &mut errors);
        scope.locals.extend(step.params.iter().map(String::as_str));
        match &step.body {
            StepBody::Block(body) => {
                collect_locals(body, &mut scope.locals);
                scope.block(body, 0);
            }
            StepBody::Return(expr) => scope.expr(expr),
            StepBody::Raw(_) => scope.raw(),
        }
    }

    let mut scope = Scope::new(&resolver, "run", &mut errors);
    match &program.run {
        Run::Expr(expr) => scope.expr(expr),
        Run::Block(body) => {
            collect_locals(body, &mut scope.locals);
            scope.block(body, 0);
        }
        Run::Raw(_) => scope.raw(),
    }

    if !errors.is_empty() {
        let mut seen = HashSet::new();
        errors.retain(|e| seen.insert(e.clone()));
        return Err(Error::Bind(errors.join("; ")));
    }

    tracing::debug!(
        steps = steps.len(),
        imports = program.imports.len(),
        "program bound"
    );

    Ok(BoundProgram {
        program: program.clone(),
        steps,
        globals,
    })
}

/* ===================== Imports ===================== */

fn resolve_module(name: &str, services: &Services) -> std::result::Result<Module, String> {
    if let Some(module) = stdlib::native_module(name) {
        return Ok(module);
    }
    let members = services
        .host
        .as_ref()
        .and_then(|host| host.resolve_module(name))
        .ok_or_else(|| format!("unknown module '{}'", name))?;

    Ok(Module {
        name: name.to_string(),
        members: members
            .into_iter()
            .map(|member| {
                let value = Val::Func(Callable::Host {
                    module: name.to_string(),
                    member: member.clone(),
                });
                (member, value)
            })
            .collect(),
    })
}

fn bind_import(
    import: &Import,
    services: &Services,
    globals: &mut IndexMap<String, Val>,
) -> std::result::Result<(), String> {
    let module = resolve_module(import.module(), services)?;
    match import {
        Import::Module { module: name, alias } => {
            let binding = match alias {
                Some(alias) => alias.clone(),
                None if name.contains('.') => {
                    return Err(format!("import of dotted module '{}' needs an alias", name))
                }
                None => name.clone(),
            };
            globals.insert(binding, Val::Module(Arc::new(module)));
        }
        Import::From { module: name, names } => {
            for member in names {
                let value = module
                    .members
                    .get(member)
                    .cloned()
                    .ok_or_else(|| format!("module '{}' has no member '{}'", name, member))?;
                globals.insert(member.clone(), value);
            }
        }
    }
    Ok(())
}

/* ===================== Callee Resolution ===================== */

struct Resolver<'a> {
    program: &'a Program,
    steps: &'a IndexMap<String, Arc<Step>>,
    globals: &'a IndexMap<String, Val>,
    services: &'a Services,
}

impl Resolver<'_> {
    fn is_known(&self, name: &str) -> bool {
        self.steps.contains_key(name)
            || self.globals.contains_key(name)
            || self.program.inputs.contains_key(name)
            || self.services.globals.contains_key(name)
            || stdlib::is_global(name)
    }

    fn has_host(&self) -> bool {
        self.services.host.is_some()
    }
}

/// Names bound anywhere in a body are visible throughout it
fn collect_locals<'a>(stmts: &'a [Stmt], out: &mut HashSet<&'a str>) {
    for stmt in stmts {
        match stmt {
            Stmt::Set { name, .. } => {
                out.insert(name);
            }
            Stmt::For { var, .. } => {
                out.insert(var);
            }
            Stmt::With { items, .. } => {
                out.extend(items.iter().filter_map(|i| i.alias.as_deref()));
            }
            _ => {}
        }
        for block in stmt.blocks() {
            collect_locals(block, out);
        }
    }
}

struct Scope<'r, 'a> {
    resolver: &'r Resolver<'a>,
    label: &'r str,
    locals: HashSet<&'a str>,
    errors: &'r mut Vec<String>,
}

impl<'r, 'a> Scope<'r, 'a> {
    fn new(resolver: &'r Resolver<'a>, label: &'r str, errors: &'r mut Vec<String>) -> Self {
        Scope {
            resolver,
            label,
            locals: HashSet::new(),
            errors,
        }
    }

    fn raw(&mut self) {
        if !self.resolver.has_host() {
            self.errors.push(format!(
                "{}: raw source requires a host substrate",
                self.label
            ));
        }
    }

    fn expr(&mut self, expr: &Expr) {
        let mut unknown = Vec::new();
        let mut raw = false;
        expr.walk(&mut |e| match e {
            Expr::Call {
                callee: Callee::Name(name),
                ..
            } => {
                if !self.locals.contains(name.as_str()) && !self.resolver.is_known(name) {
                    unknown.push(name.clone());
                }
            }
            Expr::Raw(_) => raw = true,
            _ => {}
        });

        for name in unknown {
            self.errors
                .push(format!("{}: unknown callee '{}'", self.label, name));
        }
        if raw {
            self.raw();
        }
    }

    /// `loops` counts enclosing loops for `break`/`continue` placement
    fn block(&mut self, stmts: &[Stmt], loops: usize) {
        for stmt in stmts {
            for expr in stmt.exprs() {
                self.expr(expr);
            }
            match stmt {
                Stmt::Break | Stmt::Continue if loops == 0 => {
                    let keyword = if matches!(stmt, Stmt::Break) { "break" } else { "continue" };
                    self.errors
                        .push(format!("{}: '{}' outside loop", self.label, keyword));
                }
                Stmt::Raw(_) => self.raw(),
                Stmt::For { body, .. } => self.block(body, loops + 1),
                Stmt::While { body, otherwise, .. } => {
                    self.block(body, loops + 1);
                    self.block(otherwise, loops);
                }
                Stmt::If { then, otherwise, .. } => {
                    self.block(then, loops);
                    self.block(otherwise, loops);
                }
                Stmt::With { body, .. } => self.block(body, loops),
                _ => {}
            }
        }
    }
}
