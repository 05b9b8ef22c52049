//! # Service Façade
//!
//! Stable request/response layer used by transport adapters (HTTP, stdio,
//! MCP). A method name plus a JSON parameter mapping dispatches to the
//! pipeline; every error is convertible to the uniform payload
//! `{"error": {code, message, hint, span?}}`.
//!
//! Paired parameters enforce exactly-one-of semantics: `source`/`input_path`,
//! `target`/`targets`, and `before_graph`/`before_path` (same for `after`).

use std::path::Path;

use serde_json::{json, Map, Value};

use crate::compile::{
    compile_targets, compress_source, default_pack_registry, default_plugin_manager,
    explain_source, read_source, CompileOptions, MultiTargetArtifacts, TargetArtifacts,
};
use crate::errors::CompileError;
use crate::graph::{diff_graphs, IntentGraph};
use crate::packs::PackRegistry;
use crate::plugin::PluginManager;
use crate::serialization::graph_from_json;

/// Service identity reported by `capabilities`.
pub const SERVICE_NAME: &str = "icl";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

const METHODS: [&str; 6] = [
    "capabilities",
    "check",
    "compile",
    "compress",
    "diff",
    "explain",
];

/// Dispatch a method call for integration adapters.
pub fn dispatch(method: &str, params: &Value) -> Result<Value, CompileError> {
    tracing::debug!(method, "service dispatch");
    match method {
        "compile" => compile_request(params),
        "check" => check_request(params),
        "explain" => explain_request(params),
        "compress" => compress_request(params),
        "diff" => diff_request(params),
        "capabilities" => capabilities_request(),
        _ => Err(CompileError::service(
            "SRV001",
            format!("Unknown service method '{method}'."),
            &format!("Available methods: {}", METHODS.join(", ")),
        )),
    }
}

/// Dispatch and normalize errors for transport layers. Returns `(ok, payload)`
/// where a failed payload is `{"error": {...}}`.
pub fn safe_dispatch(method: &str, params: &Value) -> (bool, Value) {
    match dispatch(method, params) {
        Ok(result) => (true, result),
        Err(err) => (false, error_payload(&err)),
    }
}

/// The uniform error payload for adapters.
pub fn error_payload(err: &CompileError) -> Value {
    json!({ "error": err.diagnostic() })
}

fn compile_request(params: &Value) -> Result<Value, CompileError> {
    let (source, filename) = resolve_source(params)?;
    let targets = resolve_targets(params)?;
    let options = CompileOptions {
        optimize: bool_param(params, "optimize"),
        debug: bool_param(params, "debug"),
    };

    let manager = build_plugin_manager(params)?;
    let registry = build_registry(params)?;
    let multi = compile_targets(&source, &filename, &targets.names, &manager, &registry, &options)?;

    if let Some(single) = targets.single {
        return Ok(single_target_result(&single, &multi, params));
    }
    Ok(multi_target_result(&multi, params))
}

fn single_target_result(target: &str, multi: &MultiTargetArtifacts, params: &Value) -> Value {
    let artifacts = &multi.targets[target];
    let mut result = Map::new();
    result.insert("target".to_string(), json!(target));
    result.insert("code".to_string(), json!(artifacts.code));
    result.insert(
        "metrics".to_string(),
        json!({
            "tokens": multi.tokens.len(),
            "nodes": artifacts.graph.nodes.len(),
            "edges": artifacts.graph.edges.len(),
        }),
    );
    if bool_param(params, "include_graph") {
        result.insert("graph".to_string(), artifacts.graph.to_json());
    }
    if bool_param(params, "include_source_map") {
        result.insert("source_map".to_string(), multi.source_map.to_json());
    }
    if bool_param(params, "include_ir") {
        result.insert("ir".to_string(), multi.ir.to_json());
    }
    if bool_param(params, "include_lowered") {
        result.insert("lowered".to_string(), artifacts.lowered.to_json());
    }
    if bool_param(params, "include_bundle") {
        result.insert(
            "bundle".to_string(),
            json!({
                "primary_path": artifacts.bundle.primary_path,
                "files": artifacts.bundle.files,
            }),
        );
    }
    if let Some(report) = &artifacts.optimization {
        result.insert("optimization".to_string(), json!(report));
    }
    Value::Object(result)
}

fn multi_target_result(multi: &MultiTargetArtifacts, params: &Value) -> Value {
    let mut outputs = Map::new();
    for target in &multi.target_order {
        let artifacts: &TargetArtifacts = &multi.targets[target];
        let mut row = Map::new();
        row.insert("code".to_string(), json!(artifacts.code));
        row.insert(
            "metrics".to_string(),
            json!({
                "nodes": artifacts.graph.nodes.len(),
                "edges": artifacts.graph.edges.len(),
            }),
        );
        row.insert(
            "bundle".to_string(),
            json!({
                "primary_path": artifacts.bundle.primary_path,
                "files": artifacts.bundle.files,
            }),
        );
        if bool_param(params, "include_graph") {
            row.insert("graph".to_string(), artifacts.graph.to_json());
        }
        if bool_param(params, "include_lowered") {
            row.insert("lowered".to_string(), artifacts.lowered.to_json());
        }
        if let Some(report) = &artifacts.optimization {
            row.insert("optimization".to_string(), json!(report));
        }
        outputs.insert(target.clone(), Value::Object(row));
    }

    let mut result = Map::new();
    result.insert("targets".to_string(), json!(multi.target_order));
    result.insert("outputs".to_string(), Value::Object(outputs));
    result.insert(
        "metrics".to_string(),
        json!({ "tokens": multi.tokens.len() }),
    );
    if bool_param(params, "include_source_map") {
        result.insert("source_map".to_string(), multi.source_map.to_json());
    }
    if bool_param(params, "include_ir") {
        result.insert("ir".to_string(), multi.ir.to_json());
    }
    Value::Object(result)
}

fn check_request(params: &Value) -> Result<Value, CompileError> {
    let (source, filename) = resolve_source(params)?;
    let manager = build_plugin_manager(params)?;
    let registry = default_pack_registry()?;
    let artifacts =
        crate::compile::check_source(&source, &filename, &manager, &registry)?;

    Ok(json!({
        "ok": true,
        "metrics": {
            "tokens": artifacts.tokens.len(),
            "nodes": artifacts.graph.nodes.len(),
            "edges": artifacts.graph.edges.len(),
        },
    }))
}

fn explain_request(params: &Value) -> Result<Value, CompileError> {
    let (source, filename) = resolve_source(params)?;
    let target = params
        .get("target")
        .and_then(Value::as_str)
        .unwrap_or("python");
    let manager = build_plugin_manager(params)?;
    let registry = build_registry(params)?;
    explain_source(&source, &filename, target, &manager, &registry)
}

fn compress_request(params: &Value) -> Result<Value, CompileError> {
    let (source, filename) = resolve_source(params)?;
    Ok(json!({ "compressed": compress_source(&source, &filename)? }))
}

fn diff_request(params: &Value) -> Result<Value, CompileError> {
    let before = resolve_graph(params, "before")?;
    let after = resolve_graph(params, "after")?;
    let diff = diff_graphs(&before, &after);
    Ok(json!({
        "added_nodes": diff.added_nodes,
        "removed_nodes": diff.removed_nodes,
        "changed_nodes": diff.changed_nodes,
        "added_edges": diff.added_edges,
        "removed_edges": diff.removed_edges,
    }))
}

fn capabilities_request() -> Result<Value, CompileError> {
    let registry = default_pack_registry()?;
    Ok(json!({
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "methods": METHODS,
        "targets": registry.targets(Some("stable")),
        "experimental_targets": registry.targets(Some("experimental")),
    }))
}

// ============================================================================
// Parameter resolution
// ============================================================================

struct ResolvedTargets {
    names: Vec<String>,
    /// Set when the caller used the singular `target` form.
    single: Option<String>,
}

fn resolve_source(params: &Value) -> Result<(String, String), CompileError> {
    let source = params.get("source");
    let input_path = params.get("input_path");

    if source.is_some() && input_path.is_some() {
        return Err(CompileError::service(
            "SRV002",
            "Provide only one of 'source' or 'input_path'.".to_string(),
            "Use inline source for API calls or file path for local source files.",
        ));
    }

    if let Some(path) = input_path.and_then(Value::as_str) {
        let text = read_source(Path::new(path)).map_err(|err| {
            CompileError::service(
                "SRV003",
                format!("Input file not found: {path}"),
                &err.diagnostic().message,
            )
        })?;
        return Ok((text, path.to_string()));
    }

    if let Some(text) = source.and_then(Value::as_str) {
        let filename = params
            .get("filename")
            .and_then(Value::as_str)
            .unwrap_or("<inline>");
        return Ok((text.to_string(), filename.to_string()));
    }

    Err(CompileError::service(
        "SRV004",
        "Missing source input.".to_string(),
        "Provide 'source' or 'input_path'.",
    ))
}

fn resolve_targets(params: &Value) -> Result<ResolvedTargets, CompileError> {
    let target = params.get("target");
    let targets = params.get("targets");

    if target.is_some() && targets.is_some() {
        return Err(CompileError::service(
            "SRV005",
            "Provide only one of 'target' or 'targets'.".to_string(),
            "Use 'target' for one output language or 'targets' for several.",
        ));
    }

    if let Some(list) = targets {
        let Some(items) = list.as_array() else {
            return Err(CompileError::service(
                "SRV006",
                "'targets' must be a list of target names.".to_string(),
                "Example: targets: [\"python\", \"js\"]",
            ));
        };
        let names: Vec<String> = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        if names.is_empty() || names.len() != items.len() {
            return Err(CompileError::service(
                "SRV006",
                "'targets' must be a non-empty list of strings.".to_string(),
                "Example: targets: [\"python\", \"js\"]",
            ));
        }
        return Ok(ResolvedTargets {
            names,
            single: None,
        });
    }

    let name = target
        .and_then(Value::as_str)
        .unwrap_or("python")
        .to_string();
    Ok(ResolvedTargets {
        names: vec![name.clone()],
        single: Some(name),
    })
}

fn resolve_graph(params: &Value, key_prefix: &str) -> Result<IntentGraph, CompileError> {
    let graph_key = format!("{key_prefix}_graph");
    let path_key = format!("{key_prefix}_path");
    let graph_obj = params.get(&graph_key);
    let graph_path = params.get(&path_key);

    if graph_obj.is_some() && graph_path.is_some() {
        return Err(CompileError::service(
            "SRV007",
            format!("Provide only one of '{graph_key}' or '{path_key}'."),
            "Pass a serialized graph object or a file path, not both.",
        ));
    }

    if let Some(obj) = graph_obj {
        if !obj.is_object() {
            return Err(CompileError::service(
                "SRV008",
                format!("'{graph_key}' must be a JSON object."),
                "Use the graph_to_json payload format.",
            ));
        }
        return Ok(IntentGraph::from_json(obj));
    }

    if let Some(path) = graph_path.and_then(Value::as_str) {
        let text = read_source(Path::new(path)).map_err(|_| {
            CompileError::service(
                "SRV009",
                format!("Graph file not found: {path}"),
                "Check graph path and file permissions.",
            )
        })?;
        return graph_from_json(&text);
    }

    Err(CompileError::service(
        "SRV010",
        format!("Missing graph input for '{key_prefix}'."),
        &format!("Provide '{graph_key}' or '{path_key}'."),
    ))
}

fn build_plugin_manager(params: &Value) -> Result<PluginManager, CompileError> {
    let specs = string_list(params, "plugins")?;
    for spec in &specs {
        if spec != "std_macros" {
            return Err(CompileError::service(
                "SRV011",
                format!("Unknown plugin '{spec}'."),
                "Available built-in plugins: std_macros.",
            ));
        }
    }
    Ok(default_plugin_manager())
}

fn build_registry(params: &Value) -> Result<PackRegistry, CompileError> {
    let specs = string_list(params, "packs")?;
    if let Some(spec) = specs.first() {
        if spec.trim().is_empty() {
            return Err(CompileError::pack(
                "PACK005",
                "Pack spec cannot be empty.".to_string(),
                "Use module[:symbol].",
            ));
        }
        return Err(CompileError::pack(
            "PACK006",
            format!("External pack loading is not available for spec '{spec}'."),
            "Register custom packs programmatically via PackRegistry::register.",
        ));
    }
    default_pack_registry()
}

fn string_list(params: &Value, key: &str) -> Result<Vec<String>, CompileError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => {
            let strings: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if strings.len() != items.len() {
                return Err(CompileError::service(
                    "SRV012",
                    format!("'{key}' must be a string or list of strings."),
                    "Example: plugins: [\"std_macros\"]",
                ));
            }
            Ok(strings)
        }
        Some(_) => Err(CompileError::service(
            "SRV012",
            format!("'{key}' must be a string or list of strings."),
            "Example: plugins: [\"std_macros\"]",
        )),
    }
}

fn bool_param(params: &Value, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_single_target_shape() {
        let result = dispatch(
            "compile",
            &json!({ "source": "x := 1 + 2;", "target": "python" }),
        )
        .expect("compile");
        assert_eq!(result["target"], json!("python"));
        assert_eq!(result["code"], json!("x = (1 + 2)\n"));
        assert!(result["metrics"]["tokens"].as_u64().expect("tokens") > 0);
        assert!(result.get("graph").is_none());
    }

    #[test]
    fn compile_multi_target_shape() {
        let result = dispatch(
            "compile",
            &json!({ "source": "x := 1;", "targets": ["python", "js"] }),
        )
        .expect("compile");
        assert_eq!(result["targets"], json!(["python", "js"]));
        assert!(result["outputs"]["python"]["code"].is_string());
        assert!(result["outputs"]["js"]["bundle"]["files"]["main.js"].is_string());
    }

    #[test]
    fn source_and_input_path_is_srv002() {
        let err = dispatch(
            "compile",
            &json!({ "source": "x := 1;", "input_path": "nope.icl", "target": "python" }),
        )
        .expect_err("should fail");
        assert_eq!(err.code(), "SRV002");
    }

    #[test]
    fn target_and_targets_is_srv005() {
        let err = dispatch(
            "compile",
            &json!({ "source": "x := 1;", "target": "python", "targets": ["js"] }),
        )
        .expect_err("should fail");
        assert_eq!(err.code(), "SRV005");
    }

    #[test]
    fn missing_source_is_srv004() {
        let err = dispatch("compile", &json!({ "target": "python" })).expect_err("should fail");
        assert_eq!(err.code(), "SRV004");
    }

    #[test]
    fn unknown_method_is_srv001() {
        let err = dispatch("transmogrify", &json!({})).expect_err("should fail");
        assert_eq!(err.code(), "SRV001");
    }

    #[test]
    fn check_reports_metrics() {
        let result = dispatch("check", &json!({ "source": "x := 1;" })).expect("check");
        assert_eq!(result["ok"], json!(true));
        assert!(result["metrics"]["nodes"].as_u64().expect("nodes") > 0);
    }

    #[test]
    fn compress_round_trip() {
        let result =
            dispatch("compress", &json!({ "source": "x := 1 + 2;" })).expect("compress");
        assert_eq!(result["compressed"], json!("x:=(1+2)\n"));
    }

    #[test]
    fn diff_over_inline_graphs() {
        let before = dispatch(
            "compile",
            &json!({ "source": "x := 1;", "target": "python", "include_graph": true }),
        )
        .expect("compile")["graph"]
            .clone();
        let after = dispatch(
            "compile",
            &json!({ "source": "x := 2;", "target": "python", "include_graph": true }),
        )
        .expect("compile")["graph"]
            .clone();

        let result = dispatch(
            "diff",
            &json!({ "before_graph": before, "after_graph": after }),
        )
        .expect("diff");
        assert_eq!(result["added_nodes"], json!([]));
        assert_eq!(result["removed_nodes"], json!([]));
        assert!(!result["changed_nodes"].as_array().expect("list").is_empty());
    }

    #[test]
    fn both_graph_and_path_is_srv007() {
        let err = dispatch(
            "diff",
            &json!({
                "before_graph": {}, "before_path": "g.json",
                "after_graph": {},
            }),
        )
        .expect_err("should fail");
        assert_eq!(err.code(), "SRV007");
    }

    #[test]
    fn missing_graph_file_is_srv009_not_the_source_code() {
        let err = dispatch(
            "diff",
            &json!({
                "before_path": "/nonexistent/graph.json",
                "after_graph": {},
            }),
        )
        .expect_err("should fail");
        assert_eq!(err.code(), "SRV009");
    }

    #[test]
    fn missing_graph_input_is_srv010() {
        let err = dispatch("diff", &json!({ "after_graph": {} })).expect_err("should fail");
        assert_eq!(err.code(), "SRV010");
    }

    #[test]
    fn capabilities_lists_methods_and_targets() {
        let result = dispatch("capabilities", &json!({})).expect("capabilities");
        assert_eq!(result["service"], json!("icl"));
        assert_eq!(result["targets"], json!(["js", "python", "rust", "web"]));
        assert_eq!(
            result["experimental_targets"].as_array().expect("list").len(),
            11
        );
    }

    #[test]
    fn safe_dispatch_wraps_errors() {
        let (ok, payload) = safe_dispatch("check", &json!({ "source": "ret 1;" }));
        assert!(!ok);
        assert_eq!(payload["error"]["code"], json!("SEM008"));
        assert!(payload["error"]["span"].is_object());
    }

    #[test]
    fn external_pack_spec_is_rejected() {
        let err = dispatch(
            "compile",
            &json!({ "source": "x := 1;", "target": "python", "packs": ["my.module:register"] }),
        )
        .expect_err("should fail");
        assert_eq!(err.code(), "PACK006");
    }
}
