//! Structural invariants of a decoded program

use super::is_identifier;
use crate::interpreter::types::{Expr, Import, Program, Run, StepBody, Stmt};
use std::collections::HashSet;

/// Collect every violated invariant, each prefixed with its location
pub(crate) fn collect_issues(program: &Program) -> Vec<String> {
    let mut issues = Vec::new();

    for name in program.inputs.keys() {
        if !is_identifier(name) {
            issues.push(format!("$.inputs: input name must be an identifier: '{}'", name));
        }
    }

    for (i, import) in program.imports.iter().enumerate() {
        let path = format!("$.imports[{}]", i);
        if import.module().is_empty() {
            issues.push(format!("{}: module name must not be empty", path));
        }
        match import {
            Import::Module {
                alias: Some(alias), ..
            } if !is_identifier(alias) => {
                issues.push(format!("{}: alias must be an identifier: '{}'", path, alias));
            }
            Import::From { names, .. } => {
                if names.is_empty() {
                    issues.push(format!("{}: from-import requires at least one name", path));
                }
                for name in names.iter().filter(|n| !is_identifier(n)) {
                    issues.push(format!("{}: imported name must be an identifier: '{}'", path, name));
                }
            }
            _ => {}
        }
    }

    let mut seen = HashSet::new();
    for step in &program.steps {
        let path = format!("$.steps[{}]", step.name);
        if !is_identifier(&step.name) {
            issues.push(format!("{}: step name must be an identifier", path));
        }
        if !seen.insert(step.name.as_str()) {
            issues.push(format!("{}: duplicate step name '{}'", path, step.name));
        }

        let mut params = HashSet::new();
        for param in &step.params {
            if !is_identifier(param) {
                issues.push(format!("{}.params: param must be an identifier: '{}'", path, param));
            }
            if !params.insert(param.as_str()) {
                issues.push(format!("{}.params: duplicate param '{}'", path, param));
            }
        }

        if let Some(timeout) = step.timeout {
            if !(timeout.is_finite() && timeout > 0.0) {
                issues.push(format!("{}.timeout: timeout must be positive seconds", path));
            }
        }

        match &step.body {
            StepBody::Block(stmts) => check_block(stmts, &format!("{}.body", path), &mut issues),
            StepBody::Return(expr) => check_expr(expr, &format!("{}.return", path), &mut issues),
            StepBody::Raw(_) => {}
        }
    }

    match &program.run {
        Run::Block(stmts) => check_block(stmts, "$.run", &mut issues),
        Run::Expr(expr) => check_expr(expr, "$.run", &mut issues),
        Run::Raw(_) => {}
    }

    issues
}

fn check_block(stmts: &[Stmt], path: &str, issues: &mut Vec<String>) {
    for (i, stmt) in stmts.iter().enumerate() {
        let path = format!("{}[{}]", path, i);

        let bound: Vec<&str> = match stmt {
            Stmt::Set { name, .. } => vec![name.as_str()],
            Stmt::For { var, .. } => vec![var.as_str()],
            Stmt::With { items, .. } => items.iter().filter_map(|i| i.alias.as_deref()).collect(),
            _ => Vec::new(),
        };
        for name in bound.into_iter().filter(|n| !is_identifier(n)) {
            issues.push(format!("{}: binding target must be an identifier: '{}'", path, name));
        }

        for expr in stmt.exprs() {
            check_expr(expr, &path, issues);
        }
        for block in stmt.blocks() {
            check_block(block, &path, issues);
        }
    }
}

fn check_expr(expr: &Expr, path: &str, issues: &mut Vec<String>) {
    expr.walk(&mut |node| {
        match node {
            Expr::Parallel(tasks) => {
                let mut names = HashSet::new();
                for task in tasks {
                    if !is_identifier(&task.name) {
                        issues.push(format!("{}: parallel task name must be an identifier: '{}'", path, task.name));
                    }
                    if !names.insert(task.name.as_str()) {
                        issues.push(format!("{}: duplicate parallel task '{}'", path, task.name));
                    }
                }
            }
            Expr::Attr { attr, .. } if attr.is_empty() => {
                issues.push(format!("{}: attribute name must not be empty", path));
            }
            _ => {}
        }
    });
}
