use super::*;
use crate::interpreter::types::{BinOp, Callee, Expr, Run, StepBody, Stmt};
use serde_json::json;

fn issues_of(doc: serde_json::Value) -> Vec<String> {
    match decode(&doc) {
        Err(Error::MalformedIr(issues)) => issues,
        other => unreachable!("Expected MalformedIr, got {:?}", other),
    }
}

#[test]
fn test_identifier_rule() {
    assert!(is_identifier("normalize"));
    assert!(is_identifier("_x1"));
    assert!(!is_identifier("1x"));
    assert!(!is_identifier("a-b"));
    assert!(!is_identifier(""));
}

#[test]
fn test_decode_minimal_program() {
    let program = decode(&json!({ "run": { "literal": 42 } })).expect("decode failed");

    assert!(program.steps.is_empty());
    assert_eq!(program.run, Run::Expr(Expr::Literal(json!(42))));
}

#[test]
fn test_missing_run_is_malformed() {
    let issues = issues_of(json!({ "steps": [] }));
    assert!(issues.iter().any(|i| i.contains("'run'")), "{:?}", issues);
}

#[test]
fn test_step_requires_exactly_one_of_body_and_return() {
    let issues = issues_of(json!({
        "steps": [
            { "name": "both", "body": { "block": [] }, "return": { "literal": 1 } },
            { "name": "neither", "params": [] }
        ],
        "run": { "literal": null }
    }));

    assert!(issues.iter().any(|i| i.contains("both") && i.contains("must not define both")));
    assert!(issues.iter().any(|i| i.contains("neither") && i.contains("must include 'body' or 'return'")));
}

#[test]
fn test_all_issues_are_collected() {
    let issues = issues_of(json!({
        "inputs": { "bad-name": 1 },
        "steps": [
            { "name": "a", "params": ["x", "x"], "retry": -1, "return": "x" },
            { "name": "a", "timeout": 0, "return": "x" }
        ],
        "run": { "call": "a", "args": [1] }
    }));

    assert!(issues.iter().any(|i| i.contains("input name")));
    assert!(issues.iter().any(|i| i.contains("duplicate param 'x'")));
    assert!(issues.iter().any(|i| i.contains("retry must be a non-negative integer")));
    assert!(issues.iter().any(|i| i.contains("duplicate step name 'a'")));
    assert!(issues.iter().any(|i| i.contains("timeout must be positive")));
}

#[test]
fn test_bare_strings() {
    let program = decode(&json!({
        "run": { "call": "f", "args": ["x", "text.strip", "x + 1"] }
    }))
    .expect("decode failed");

    let Run::Expr(Expr::Call { callee, args, .. }) = program.run else {
        unreachable!("Expected call run");
    };
    assert_eq!(callee, Callee::Name("f".to_string()));
    assert_eq!(args[0], Expr::name("x"));
    assert_eq!(
        args[1],
        Expr::Attr {
            base: Box::new(Expr::name("text")),
            attr: "strip".to_string()
        }
    );
    assert_eq!(args[2], Expr::Raw("x + 1".to_string()));
}

#[test]
fn test_statement_forms() {
    let program = decode(&json!({
        "steps": [{
            "name": "loop",
            "params": ["n"],
            "body": { "block": [
                { "set": { "name": "i", "value": { "literal": 0 } } },
                { "while": {
                    "cond": { "binop": { "op": "<", "left": "i", "right": "n" } },
                    "body": [ { "set": { "name": "i", "value": { "binop": { "op": "+", "left": "i", "right": 1 } } } } ],
                    "else": [ { "return": "i" } ]
                } },
                { "raise": null }
            ] }
        }],
        "run": { "call": "loop", "args": [3] }
    }))
    .expect("decode failed");

    let StepBody::Block(stmts) = &program.steps[0].body else {
        unreachable!("Expected block body");
    };
    assert_eq!(stmts.len(), 3);
    let Stmt::While { cond, otherwise, .. } = &stmts[1] else {
        unreachable!("Expected while, got {:?}", stmts[1]);
    };
    assert!(matches!(cond, Expr::BinOp { op: BinOp::Lt, .. }));
    assert_eq!(otherwise, &vec![Stmt::Return(Expr::name("i"))]);
    assert_eq!(stmts[2], Stmt::Raise(None));
}

#[test]
fn test_raw_body_forms() {
    let program = decode(&json!({
        "steps": [
            { "name": "a", "body": "x = 1\nreturn x" },
            { "name": "b", "body": ["return 2"] },
            { "name": "c", "body": { "python": ["return 3"] } }
        ],
        "run": { "literal": null }
    }))
    .expect("decode failed");

    assert_eq!(
        program.steps[0].body,
        StepBody::Raw(vec!["x = 1".to_string(), "return x".to_string()])
    );
    assert_eq!(program.steps[1].body, StepBody::Raw(vec!["return 2".to_string()]));
    assert_eq!(program.steps[2].body, StepBody::Raw(vec!["return 3".to_string()]));
}

#[test]
fn test_encode_is_canonical() {
    let doc = json!({
        "meta": { "name": "demo" },
        "imports": ["json", { "import": "time", "as": "t" }, { "from": "math", "import": ["floor"] }],
        "inputs": { "n": 2 },
        "steps": [{
            "name": "twice",
            "params": ["x"],
            "retry": 1,
            "timeout": 2,
            "guard": ["bad"],
            "return": { "binop": { "op": "*", "left": { "name": "x" }, "right": { "literal": 2 } } }
        }],
        "run": { "call": "twice", "args": [{ "name": "n" }], "kwargs": {} }
    });

    let program = decode(&doc).expect("decode failed");
    let encoded = encode(&program);

    assert_eq!(encoded, doc);
    assert_eq!(decode(&encoded).expect("re-decode failed"), program);
}
