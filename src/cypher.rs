use serde_json::{Map, Value};

use crate::{
    error::{SyncError, SyncResult},
    models::{GraphSnapshot, NodeLabel},
};

/// Rejects text that cannot be carried inside a quoted Cypher literal.
/// Tab, newline and carriage return have escape sequences; other control
/// characters do not.
pub fn ensure_embeddable(field: &str, value: &str) -> SyncResult<()> {
    if value
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(SyncError::EscapingViolation {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

pub fn escape_cypher_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn literal(field: &str, value: &Value) -> SyncResult<Option<String>> {
    let rendered = match value {
        Value::String(s) => {
            ensure_embeddable(field, s)?;
            format!("'{}'", escape_cypher_string(s))
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return Ok(None),
    };
    Ok(Some(rendered))
}

fn set_clause(var: &str, key_property: &str, properties: &Map<String, Value>) -> SyncResult<String> {
    let mut parts = Vec::new();
    for (name, value) in properties {
        if name == key_property {
            continue;
        }
        if let Some(rendered) = literal(name, value)? {
            parts.push(format!("{var}.{name} = {rendered}"));
        }
    }
    if parts.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" SET {}", parts.join(", ")))
    }
}

fn node_pattern(var: &str, label: NodeLabel, key: &str) -> SyncResult<String> {
    ensure_embeddable(label.key_property(), key)?;
    Ok(format!(
        "({var}:{} {{{}: '{}'}})",
        label.as_str(),
        label.key_property(),
        escape_cypher_string(key)
    ))
}

/// Renders a snapshot as idempotent `MERGE` statements, nodes first so every
/// relationship can `MATCH` its endpoints.
pub fn export_script(snapshot: &GraphSnapshot) -> SyncResult<String> {
    let mut script = String::new();

    for node in &snapshot.nodes {
        let pattern = node_pattern("n", node.label, &node.key)?;
        let set = set_clause("n", node.label.key_property(), &node.properties)?;
        script.push_str(&format!("MERGE {pattern}{set};\n"));
    }

    if !snapshot.edges.is_empty() {
        script.push('\n');
    }

    for edge in &snapshot.edges {
        let from = node_pattern("a", edge.from.label, &edge.from.key)?;
        let to = node_pattern("b", edge.to.label, &edge.to.key)?;
        script.push_str(&format!(
            "MATCH {from}, {to} MERGE (a)-[:{}]->(b);\n",
            edge.kind.as_str()
        ));
    }

    Ok(script)
}
