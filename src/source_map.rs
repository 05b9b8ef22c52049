//! Source location and node provenance mapping.
//!
//! Every AST/IR/graph node carries a [`SourceSpan`] pointing back at the
//! original text; the [`SourceMap`] collects per-node provenance entries for
//! downstream tooling (explain output, graph diffing UIs).

use serde::{Deserialize, Serialize};

/// A source range in 1-based coordinates: inclusive start, exclusive end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceSpan {
    pub fn new(file: &str, line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        SourceSpan {
            file: file.to_string(),
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// Merge two spans into one covering `start_of_first .. end_of_last`.
    pub fn merge(start: &SourceSpan, end: &SourceSpan) -> SourceSpan {
        SourceSpan {
            file: start.file.clone(),
            line: start.line,
            column: start.column,
            end_line: end.end_line,
            end_column: end.end_column,
        }
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Maps one graph node to its source provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    pub node_id: String,
    pub span: SourceSpan,
    #[serde(default)]
    pub note: String,
}

/// Provenance table populated while building the Intent Graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    pub entries: Vec<SourceMapEntry>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Append an entry mapping `node_id` to a span.
    pub fn add(&mut self, node_id: &str, span: SourceSpan, note: &str) {
        self.entries.push(SourceMapEntry {
            node_id: node_id.to_string(),
            span,
            note: note.to_string(),
        });
    }

    /// Serialize the full source map with its schema version.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "schema_version": "1.0",
            "entries": self.entries,
        })
    }
}
