//! Serialization helpers for Intent Graphs and source maps.

use std::fs;
use std::path::Path;

use crate::errors::CompileError;
use crate::graph::IntentGraph;
use crate::source_map::SourceMap;

/// Serialize an IntentGraph to pretty JSON text.
pub fn graph_to_json(graph: &IntentGraph) -> String {
    serde_json::to_string_pretty(&graph.to_json()).unwrap_or_else(|_| "{}".to_string())
}

/// Deserialize an IntentGraph from JSON text.
pub fn graph_from_json(payload: &str) -> Result<IntentGraph, CompileError> {
    let data: serde_json::Value = serde_json::from_str(payload).map_err(|err| {
        CompileError::cli(
            "CLI012",
            format!("Invalid graph JSON: {err}"),
            "Provide a graph produced by graph_to_json.",
        )
    })?;
    Ok(IntentGraph::from_json(&data))
}

/// Write serialized graph JSON to a path.
pub fn write_graph(graph: &IntentGraph, path: &Path) -> Result<(), CompileError> {
    write_text(path, &graph_to_json(graph))
}

/// Write source map JSON to a path.
pub fn write_source_map(source_map: &SourceMap, path: &Path) -> Result<(), CompileError> {
    let payload =
        serde_json::to_string_pretty(&source_map.to_json()).unwrap_or_else(|_| "{}".to_string());
    write_text(path, &payload)
}

fn write_text(path: &Path, contents: &str) -> Result<(), CompileError> {
    fs::write(path, contents).map_err(|err| {
        CompileError::cli(
            "CLI011",
            format!("Failed to write '{}': {err}", path.display()),
            "Check output path and permissions.",
        )
    })
}
