//! Error taxonomy tests: stable codes, spans, and tier separation.

use icl::compile::{
    compile_source, default_pack_registry, default_plugin_manager, CompileOptions,
};
use icl::errors::CompileError;

fn compile_err(source: &str, target: &str) -> CompileError {
    let manager = default_plugin_manager();
    let registry = default_pack_registry().expect("registry");
    compile_source(
        source,
        "<test>",
        target,
        &manager,
        &registry,
        &CompileOptions::default(),
    )
    .expect_err("compile should fail")
}

#[test]
fn unknown_character_is_lex001() {
    let err = compile_err("x := 1 ~ 2;", "python");
    assert_eq!(err.code(), "LEX001");
    assert!(matches!(err, CompileError::Lex(_)));
}

#[test]
fn unterminated_string_is_lex002() {
    let err = compile_err("s := \"open;", "python");
    assert_eq!(err.code(), "LEX002");
}

#[test]
fn bad_expression_is_par001() {
    let err = compile_err("x := ;", "python");
    assert_eq!(err.code(), "PAR001");
    assert!(matches!(err, CompileError::Parse(_)));
}

#[test]
fn missing_brace_is_par002() {
    let err = compile_err("if x > 1 ? y := 2;", "python");
    assert_eq!(err.code(), "PAR002");
}

#[test]
fn return_outside_function_is_sem008() {
    let err = compile_err("ret 1;", "python");
    assert_eq!(err.code(), "SEM008");
    assert!(matches!(err, CompileError::Semantic(_)));
    assert!(err.diagnostic().span.is_some());
}

#[test]
fn annotation_mismatch_is_sem002() {
    let err = compile_err("x:Num := \"hello\";", "python");
    assert_eq!(err.code(), "SEM002");
}

#[test]
fn arity_mismatch_is_sem019() {
    let err = compile_err("fn add(a,b)=>a+b; x := add(1);", "python");
    assert_eq!(err.code(), "SEM019");
}

#[test]
fn unknown_macro_is_sem010() {
    let err = compile_err("#mystery(1);", "python");
    assert_eq!(err.code(), "SEM010");
}

#[test]
fn unknown_target_is_pack001() {
    let err = compile_err("x := 1;", "cobol");
    assert_eq!(err.code(), "PACK001");
    assert!(matches!(err, CompileError::Pack(_)));
    assert!(err.diagnostic().hint.contains("python"));
}

#[test]
fn unsupported_feature_is_low001_not_other_codes() {
    let err = compile_err("ok := true && false;", "go");
    assert_eq!(err.code(), "LOW001");
    assert!(matches!(err, CompileError::Lowering(_)));
    assert!(err.diagnostic().message.contains("logic"));
}

#[test]
fn diagnostics_render_with_location() {
    let err = compile_err("ret 1;", "python");
    let rendered = err.diagnostic().render();
    assert!(rendered.starts_with("SEM008 <test>:1:1"));
    assert!(rendered.contains("Hint:"));
}

#[test]
fn service_error_payload_shape() {
    let (ok, payload) = icl::service::safe_dispatch(
        "compile",
        &serde_json::json!({ "source": "ret 1;", "target": "python" }),
    );
    assert!(!ok);
    let error = &payload["error"];
    assert_eq!(error["code"], serde_json::json!("SEM008"));
    assert!(error["message"].is_string());
    assert!(error["span"]["line"].as_u64().expect("line") >= 1);
}
