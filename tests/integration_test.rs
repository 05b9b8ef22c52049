//! End-to-end pipeline tests over the stable targets.

use icl::compile::{
    compile_source, compile_targets, default_pack_registry, default_plugin_manager,
    CompileOptions,
};
use icl::packs::PackRegistry;
use icl::plugin::PluginManager;

struct Env {
    manager: PluginManager,
    registry: PackRegistry,
}

fn env() -> Env {
    Env {
        manager: default_plugin_manager(),
        registry: default_pack_registry().expect("builtin registry"),
    }
}

fn compile(source: &str, target: &str) -> icl::CompileArtifacts {
    let env = env();
    compile_source(
        source,
        "<test>",
        target,
        &env.manager,
        &env.registry,
        &CompileOptions::default(),
    )
    .expect("compile")
}

const GOLDEN_PROGRAMS: [(&str, &str); 5] = [
    (
        "factorial",
        "fn fact(n:Num):Num { if n <= 1 ? { ret 1; } : { ret n * @fact(n - 1); } } @print(@fact(5));",
    ),
    (
        "loop_sum",
        "sum := 0; loop i in 0..5 { sum := sum + i; } @print(sum);",
    ),
    (
        "nested_conditional",
        "x := 3; if x > 2 ? { if x < 10 ? { @print(1); } : { @print(2); } } : { @print(0); }",
    ),
    (
        "function_chain",
        "fn add(a:Num,b:Num):Num => a + b; fn twice(v:Num):Num => @add(v, v); @print(@twice(7));",
    ),
    (
        "logic_gate",
        "ok := true && !false; if ok ? { @print(1); } : { @print(0); }",
    ),
];

#[test]
fn stable_targets_compile_all_golden_programs() {
    for (name, source) in GOLDEN_PROGRAMS {
        for target in ["python", "js", "rust", "web"] {
            let artifacts = compile(source, target);
            assert!(
                !artifacts.code.trim().is_empty(),
                "empty output for {name}/{target}"
            );

            match target {
                "web" => {
                    assert!(artifacts.bundle.files.contains_key("index.html"));
                    assert!(artifacts.bundle.files.contains_key("styles.css"));
                    assert!(artifacts.bundle.files.contains_key("app.js"));
                }
                "python" => assert!(artifacts.bundle.files.contains_key("main.py")),
                "js" => assert!(artifacts.bundle.files.contains_key("main.js")),
                "rust" => assert!(artifacts.bundle.files.contains_key("main.rs")),
                _ => {}
            }
        }
    }
}

#[test]
fn python_assignment_scenario() {
    let artifacts = compile("x := 1 + 2;", "python");
    assert!(artifacts.code.contains("x = (1 + 2)"));
    assert!(artifacts.code.ends_with('\n'));
}

#[test]
fn js_statement_order_scenario() {
    let artifacts = compile("x := 1; y := x + 2;", "js");
    let x_pos = artifacts.code.find("let x = 1;").expect("x declaration");
    let y_pos = artifacts.code.find("let y = (x + 2);").expect("y declaration");
    assert!(x_pos < y_pos);
}

#[test]
fn python_function_scenario() {
    let artifacts = compile("fn add(a,b):Num => a + b; out := add(1,2);", "python");
    assert!(artifacts.code.contains("def add(a, b):"));
    assert!(artifacts.code.contains("out = add(1, 2)"));

    let env = env();
    icl::compile::check_source(
        "fn add(a,b):Num => a + b; out := add(1,2);",
        "<test>",
        &env.manager,
        &env.registry,
    )
    .expect("check-only succeeds");
}

#[test]
fn optimized_compile_folds_and_drops_dead_assignment() {
    let env = env();
    let artifacts = compile_source(
        "x := 1 + 2;",
        "<test>",
        "python",
        &env.manager,
        &env.registry,
        &CompileOptions {
            optimize: true,
            debug: false,
        },
    )
    .expect("compile");

    let folded = artifacts
        .graph
        .nodes
        .values()
        .find(|n| {
            n.kind == "LiteralIntent"
                && n.attrs.get("folded_from") == Some(&serde_json::json!("+"))
        })
        .expect("folded literal present");
    assert_eq!(folded.attrs["value"], serde_json::json!(3));

    assert!(!artifacts.graph.nodes.values().any(|n| {
        n.kind == "AssignmentIntent" && n.attrs.get("name") == Some(&serde_json::json!("x"))
    }));

    let report = artifacts.optimization.expect("report");
    assert_eq!(report.folded_operations, 1);
    assert_eq!(report.removed_assignments, 1);
}

#[test]
fn web_print_bundle_scenario() {
    let artifacts = compile("print(1);", "web");
    let keys: Vec<&String> = artifacts.bundle.files.keys().collect();
    assert_eq!(keys, vec!["app.js", "index.html", "styles.css"]);
    let app = &artifacts.bundle.files["app.js"];
    assert!(app.contains("function print(value)"));
    assert!(app.contains("icl-output"));
}

#[test]
fn macro_expansion_flows_through_pipeline() {
    let artifacts = compile("#echo(42);", "python");
    assert!(artifacts.code.contains("print(42)"));

    let artifacts = compile("#dbg(7);", "js");
    assert!(artifacts.code.contains("print(\"dbg:\");"));
    assert!(artifacts.code.contains("print(7);"));
}

#[test]
fn rust_target_emits_main_wrapper() {
    let artifacts = compile("x := 1; print(x);", "rust");
    assert!(artifacts.code.contains("fn main() {"));
    assert!(artifacts.code.contains("println!"));
}

#[test]
fn compile_is_deterministic() {
    let source = GOLDEN_PROGRAMS[0].1;
    let first = compile(source, "python");
    let second = compile(source, "python");
    assert_eq!(first.code, second.code);
    assert_eq!(first.graph, second.graph);
    assert_eq!(first.source_map, second.source_map);
    assert_eq!(
        serde_json::to_string(&first.ir.to_json()).expect("json"),
        serde_json::to_string(&second.ir.to_json()).expect("json")
    );
}

#[test]
fn single_source_multi_emit_shares_frontend() {
    let env = env();
    let source = "fn add(a,b) => a + b; out := add(1, 2);";
    let options = CompileOptions::default();

    let both = compile_targets(
        source,
        "<test>",
        &["python".to_string(), "js".to_string()],
        &env.manager,
        &env.registry,
        &options,
    )
    .expect("multi compile");
    let python_only = compile_targets(
        source,
        "<test>",
        &["python".to_string()],
        &env.manager,
        &env.registry,
        &options,
    )
    .expect("python compile");
    let js_only = compile_targets(
        source,
        "<test>",
        &["js".to_string()],
        &env.manager,
        &env.registry,
        &options,
    )
    .expect("js compile");

    assert_eq!(both.ir.to_json(), python_only.ir.to_json());
    assert_eq!(both.ir.to_json(), js_only.ir.to_json());
    assert_eq!(both.source_map, python_only.source_map);
    assert_eq!(both.source_map, js_only.source_map);

    assert_eq!(
        both.targets["python"].code,
        python_only.targets["python"].code
    );
    assert_eq!(both.targets["js"].code, js_only.targets["js"].code);
}

#[test]
fn duplicate_targets_dedupe_preserving_order() {
    let env = env();
    let multi = compile_targets(
        "x := 1;",
        "<test>",
        &["js".to_string(), "python".to_string(), "js".to_string()],
        &env.manager,
        &env.registry,
        &CompileOptions::default(),
    )
    .expect("compile");
    assert_eq!(multi.target_order, vec!["js", "python"]);
    assert_eq!(multi.targets.len(), 2);
}

#[test]
fn alias_lookup_compiles_through_canonical_pack() {
    let artifacts = compile("x := 1;", "py");
    assert_eq!(artifacts.code, "x = 1\n");
    let artifacts = compile("x := 1;", "node");
    assert_eq!(artifacts.code, "let x = 1;\n");
}

#[test]
fn graph_and_sourcemap_files_can_be_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    let graph_path = dir.path().join("graph.json");
    let map_path = dir.path().join("map.json");

    let artifacts = compile("x := 1;", "python");
    icl::serialization::write_graph(&artifacts.graph, &graph_path).expect("write graph");
    icl::serialization::write_source_map(&artifacts.source_map, &map_path).expect("write map");

    let restored = icl::serialization::graph_from_json(
        &std::fs::read_to_string(&graph_path).expect("read"),
    )
    .expect("parse");
    assert_eq!(restored, artifacts.graph);

    let map_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&map_path).expect("read")).expect("json");
    assert_eq!(map_json["schema_version"], serde_json::json!("1.0"));
    assert!(!map_json["entries"].as_array().expect("entries").is_empty());
}

#[test]
fn compile_file_reads_source_and_reports_missing_input() {
    let env = env();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("program.icl");
    std::fs::write(&path, "x := 1 + 2;\n").expect("write");

    let artifacts = icl::compile::compile_file(
        &path,
        "python",
        &env.manager,
        &env.registry,
        &CompileOptions::default(),
    )
    .expect("compile");
    assert_eq!(artifacts.code, "x = (1 + 2)\n");

    let err = icl::compile::compile_file(
        &dir.path().join("missing.icl"),
        "python",
        &env.manager,
        &env.registry,
        &CompileOptions::default(),
    )
    .expect_err("missing file");
    assert_eq!(err.code(), "CLI001");
}

#[test]
fn span_locality_holds_for_ast_nodes() {
    let env = env();
    let multi = compile_targets(
        "x := 1;\ny := x + 2;\n",
        "<test>",
        &["python".to_string()],
        &env.manager,
        &env.registry,
        &CompileOptions::default(),
    )
    .expect("compile");

    for stmt in &multi.program.statements {
        assert!(stmt.span.line >= 1);
        assert!(stmt.span.column >= 1);
        assert!(
            (stmt.span.end_line, stmt.span.end_column) >= (stmt.span.line, stmt.span.column),
            "span must not run backwards"
        );
    }
}
