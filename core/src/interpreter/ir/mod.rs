//! JSON intermediate representation
//!
//! Decoding, canonical encoding and structural validation of programs in
//! their JSON form. Both front-ends end here: JSON files are decoded
//! directly, surface files are parsed into the same JSON document first.

mod decode;
mod encode;
mod validate;

#[cfg(test)]
mod tests;

pub use encode::{encode, encode_block, encode_expr, encode_stmt};

use super::errors::{Error, Result};
use super::types::Program;
use serde_json::Value as JsonValue;

/// `^[A-Za-z_][A-Za-z0-9_]*$`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Decode and validate a JSON IR document
pub fn decode(doc: &JsonValue) -> Result<Program> {
    let mut decoder = decode::Decoder::default();
    let program = decoder.program(doc);
    let mut issues = decoder.issues;

    if let Some(program) = &program {
        issues.extend(validate::collect_issues(program));
    }

    match program {
        Some(program) if issues.is_empty() => Ok(program),
        _ => Err(Error::MalformedIr(issues)),
    }
}

/// Decode a JSON IR document from text
pub fn decode_str(text: &str) -> Result<Program> {
    let doc: JsonValue = serde_json::from_str(text)
        .map_err(|e| Error::MalformedIr(vec![format!("$: invalid JSON: {}", e)]))?;
    decode(&doc)
}

/// Check the invariants of a program built in code
pub fn validate(program: &Program) -> Result<()> {
    let issues = validate::collect_issues(program);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::MalformedIr(issues))
    }
}
