//! Contract harness tests: declared coverage vs observed behavior.

use icl::compile::{
    compile_source, default_pack_registry, default_plugin_manager, CompileOptions,
};
use icl::contract::{run_contract_suite, FeatureStatus};
use icl::lowering::Feature;

#[test]
fn stable_suite_passes_without_contradictions() {
    let registry = default_pack_registry().expect("registry");
    let report = run_contract_suite(&registry, None, true).expect("suite");

    assert!(report.ok);
    assert!(report.stable_only);
    for (target, matrix) in &report.feature_matrix {
        assert!(
            matrix.contradictions.is_empty(),
            "{target} has contradictions: {:?}",
            matrix.contradictions
        );
    }
}

#[test]
fn full_suite_covers_experimental_targets() {
    let registry = default_pack_registry().expect("registry");
    let report = run_contract_suite(&registry, None, false).expect("suite");

    assert!(report.ok);
    assert_eq!(report.targets.len(), 15);
    assert!(report.targets.contains(&"lua".to_string()));

    // Experimental packs enforce their declared-unsupported features with
    // LOW001 on every exercising case.
    let matrix = &report.feature_matrix["typescript"];
    for feature in [Feature::TypedAnnotation, Feature::Logic, Feature::AtCall] {
        assert_eq!(
            matrix.features[&feature].status,
            FeatureStatus::UnsupportedEnforced,
            "feature {feature}"
        );
        assert!(matrix.features[&feature].low001_count > 0);
    }
}

#[test]
fn experimental_pack_rejects_typed_annotation_with_low001() {
    let manager = default_plugin_manager();
    let registry = default_pack_registry().expect("registry");

    let err = compile_source(
        "v:Num := 1;",
        "<test>",
        "go",
        &manager,
        &registry,
        &CompileOptions::default(),
    )
    .expect_err("should fail");
    assert_eq!(err.code(), "LOW001");
    assert!(err.diagnostic().message.contains("typed_annotation"));

    compile_source(
        "v := 1;",
        "<test>",
        "go",
        &manager,
        &registry,
        &CompileOptions::default(),
    )
    .expect("untyped assignment compiles");
}

#[test]
fn report_serializes_for_transport() {
    let registry = default_pack_registry().expect("registry");
    let report = run_contract_suite(&registry, Some(&["python".to_string()]), true).expect("suite");
    let json = serde_json::to_value(&report).expect("serialize");

    assert_eq!(json["ok"], serde_json::json!(true));
    assert_eq!(json["targets"], serde_json::json!(["python"]));
    assert_eq!(
        json["feature_matrix"]["python"]["features"]["assignment"]["status"],
        serde_json::json!("supported")
    );
    assert_eq!(
        json["summary"]["python"]["total"],
        serde_json::json!(report.results.len())
    );
}

#[test]
fn per_case_results_carry_error_codes() {
    let registry = default_pack_registry().expect("registry");
    let report = run_contract_suite(&registry, Some(&["go".to_string()]), false).expect("suite");

    let rejected: Vec<_> = report.results.iter().filter(|r| !r.ok).collect();
    assert!(!rejected.is_empty());
    for result in rejected {
        assert_eq!(result.error_code.as_deref(), Some("LOW001"));
        assert!(result.error_message.is_some());
    }
}
