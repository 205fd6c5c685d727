//! Cypher literal encoding
//!
//! Pure functions, deterministic output. Everything that ends up inside a
//! generated statement goes through here: escaped strings, property maps,
//! label sets, node and relationship patterns.

use crate::graph::{Properties, Value};

/// Escape a string for a double-quoted Cypher literal. The ampersand is
/// rewritten to a literal `\u0026` sequence so the emitted script stays
/// safe for HTML-unsafe downstream consumers.
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '&' => out.push_str("\\u0026"),
            _ => out.push(c),
        }
    }
    out
}

pub fn encode_string(value: &str) -> String {
    format!("\"{}\"", escape_string(value))
}

pub fn encode_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => encode_string(s),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(encode_value).collect();
            format!("[{}]", items.join(","))
        }
    }
}

/// Encode a property map, dropping keys listed in `ignore`. An empty
/// result encodes to the empty string, not `{}`.
pub fn encode_properties(properties: &Properties, ignore: Option<&[String]>) -> String {
    let mut parts = Vec::with_capacity(properties.len());
    for (key, value) in properties {
        if ignore.is_some_and(|ignored| ignored.iter().any(|i| i == key)) {
            continue;
        }
        parts.push(format!("`{}`:{}", key, encode_value(value)));
    }
    if parts.is_empty() {
        return String::new();
    }
    format!("{{{}}}", parts.join(","))
}

/// Encode a label set: each label backtick-quoted and colon-prefixed,
/// no separator. Empty set encodes to the empty string.
pub fn encode_labels(labels: &[String]) -> String {
    labels
        .iter()
        .map(|label| format!(":`{}`", escape_string(label)))
        .collect()
}

/// Bind-variable token for a node, derived from its source id.
pub fn node_var(id: i64) -> String {
    format!("_{id}")
}

/// Node pattern `(<var><labels><props>)`. The variable is only emitted
/// when the literal must be referenced later in the same statement
/// (direct transfer needs a RETURN binding; script mode never does).
pub fn node_literal(id: i64, labels: &[String], properties: &Properties, bind_variable: bool) -> String {
    let var = if bind_variable { node_var(id) } else { String::new() };
    format!(
        "({}{}{})",
        var,
        encode_labels(labels),
        encode_properties(properties, None)
    )
}

/// Relationship pattern `left-[:`TYPE`{props}]->right`.
pub fn relationship_literal(
    rel_type: &str,
    properties: &Properties,
    left_ref: &str,
    right_ref: &str,
    ignore: Option<&[String]>,
) -> String {
    format!(
        "{}-[:`{}`{}]->{}",
        left_ref,
        escape_string(rel_type),
        encode_properties(properties, ignore),
        right_ref
    )
}
