//! # Backend Emitters
//!
//! Graph-walking source emitters for the stable targets. A backend receives
//! an Intent Graph (derived from a lowered module) and produces source text;
//! whitespace and structure are backend-defined but semantics must match the
//! ICL feature catalog contract.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::graph::IntentGraph;

pub mod js;
pub mod python;
pub mod rust;

pub use js::JavaScriptBackend;
pub use python::PythonBackend;
pub use rust::RustBackend;

/// Compilation context passed into backend emitters.
#[derive(Debug, Clone, Default)]
pub struct ExpansionContext {
    pub target: String,
    pub debug: bool,
    pub metadata: BTreeMap<String, String>,
}

impl ExpansionContext {
    pub fn for_target(target: &str) -> Self {
        ExpansionContext {
            target: target.to_string(),
            ..ExpansionContext::default()
        }
    }
}

/// Abstract target language backend contract.
pub trait BackendEmitter {
    /// Backend target name.
    fn name(&self) -> &'static str;

    /// Emit full source text for a module graph.
    fn emit_module(&self, graph: &IntentGraph, context: &ExpansionContext) -> String;
}

/// Indent all non-empty lines by `level` four-space units.
pub(crate) fn indent(text: &str, level: usize) -> String {
    let prefix = "    ".repeat(level);
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a literal attr value as JSON source text (used by the C-family
/// emitters, where JSON literal syntax is valid source).
pub(crate) fn json_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_string()),
    }
}
