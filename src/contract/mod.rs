//! # Contract Test Harness
//!
//! Compiles every (target x fixture) pair and builds a feature-status matrix
//! comparing each pack's declared coverage against observed behavior. The
//! harness leans on `LOW001` being distinguishable from every other failure:
//! a declared-unsupported feature must be rejected with exactly that code.
//!
//! Verdicts: a stable target passes iff it has no contradictions and every
//! required-stable feature is `supported`; an experimental target passes iff
//! it has no contradictions.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::compile::{compile_source, default_plugin_manager, CompileOptions};
use crate::errors::CompileError;
use crate::lowering::Feature;
use crate::packs::PackRegistry;

/// Single contract fixture for cross-target compilation checks.
#[derive(Debug, Clone)]
pub struct ContractCase {
    pub name: &'static str,
    pub source: &'static str,
    pub features: &'static [Feature],
    pub required_for_stable: bool,
}

/// Result for one case/target compilation run.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub case: String,
    pub target: String,
    pub ok: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Observed status for one feature on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Supported,
    UnsupportedEnforced,
    Unexercised,
    DeclaredSupportedButRejected,
    DeclaredSupportedButFailed,
    DeclaredUnsupportedButPassed,
    DeclaredUnsupportedButFailedNonstruct,
}

impl FeatureStatus {
    /// Contradictions are any declared-vs-observed mismatch.
    pub fn is_contradiction(self) -> bool {
        matches!(
            self,
            FeatureStatus::DeclaredSupportedButRejected
                | FeatureStatus::DeclaredSupportedButFailed
                | FeatureStatus::DeclaredUnsupportedButPassed
                | FeatureStatus::DeclaredUnsupportedButFailedNonstruct
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureStatus::Supported => "supported",
            FeatureStatus::UnsupportedEnforced => "unsupported_enforced",
            FeatureStatus::Unexercised => "unexercised",
            FeatureStatus::DeclaredSupportedButRejected => "declared_supported_but_rejected",
            FeatureStatus::DeclaredSupportedButFailed => "declared_supported_but_failed",
            FeatureStatus::DeclaredUnsupportedButPassed => "declared_unsupported_but_passed",
            FeatureStatus::DeclaredUnsupportedButFailedNonstruct => {
                "declared_unsupported_but_failed_nonstruct"
            }
        }
    }
}

/// Per-feature cell of the matrix.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureReport {
    pub declared_supported: bool,
    pub status: FeatureStatus,
    pub cases: Vec<String>,
    pub pass_count: usize,
    pub low001_count: usize,
    pub other_fail_count: usize,
}

/// Per-target verdict summary.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    pub passed: usize,
    pub total: usize,
    pub stability: String,
    pub all_cases_ok: bool,
    pub stable_feature_ok: bool,
    pub target_ok: bool,
}

/// Per-target matrix row.
#[derive(Debug, Clone, Serialize)]
pub struct TargetMatrix {
    pub target: String,
    pub stability: String,
    pub contradictions: Vec<String>,
    pub features: BTreeMap<Feature, FeatureReport>,
}

/// Full contract suite report.
#[derive(Debug, Clone, Serialize)]
pub struct ContractReport {
    pub ok: bool,
    pub stable_only: bool,
    pub targets: Vec<String>,
    pub required_stable_features: Vec<Feature>,
    pub results: Vec<CaseResult>,
    pub summary: BTreeMap<String, TargetSummary>,
    pub feature_matrix: BTreeMap<String, TargetMatrix>,
}

/// Canonical fixture programs, each labeled with the features it exercises.
pub fn contract_cases() -> Vec<ContractCase> {
    use Feature::*;
    vec![
        ContractCase {
            name: "assignment_arithmetic",
            source: "x := 1 + 2;",
            features: &[Assignment, Arithmetic, Literal],
            required_for_stable: true,
        },
        ContractCase {
            name: "reference_reuse",
            source: "x := 1; y := x + 2;",
            features: &[Assignment, Reference, Arithmetic, Literal],
            required_for_stable: true,
        },
        ContractCase {
            name: "function_call_return",
            source: "fn add(a, b) { ret a + b; } out := add(1, 2);",
            features: &[Function, Return, Call, Assignment, Arithmetic, Literal, Reference],
            required_for_stable: true,
        },
        ContractCase {
            name: "if_else_comparison",
            source: "x := 2; if x > 1 ? { y := x; } : { y := 0; }",
            features: &[If, Comparison, Assignment, Literal, Reference],
            required_for_stable: true,
        },
        ContractCase {
            name: "loop_update",
            source: "sum := 0; loop i in 0..3 { sum := sum + i; }",
            features: &[Loop, Assignment, Arithmetic, Literal, Reference],
            required_for_stable: true,
        },
        ContractCase {
            name: "unary_logic",
            source: "ok := true && !false;",
            features: &[Assignment, Logic, Unary, Literal],
            required_for_stable: true,
        },
        ContractCase {
            name: "expression_stmt_call",
            source: "print(1);",
            features: &[ExpressionStmt, Call, Literal],
            required_for_stable: true,
        },
        ContractCase {
            name: "typed_annotation",
            source: "v:Num := 1;",
            features: &[TypedAnnotation, Assignment, Literal],
            required_for_stable: true,
        },
        ContractCase {
            name: "at_call",
            source: "fn inc(n) { ret n + 1; } z := @inc(1);",
            features: &[AtCall, Call, Function, Return, Assignment, Arithmetic, Literal, Reference],
            required_for_stable: true,
        },
    ]
}

/// Every feature any fixture exercises, sorted.
pub fn all_features(cases: &[ContractCase]) -> Vec<Feature> {
    let set: BTreeSet<Feature> = cases
        .iter()
        .flat_map(|c| c.features.iter().copied())
        .collect();
    set.into_iter().collect()
}

/// Features exercised by stable-required fixtures, sorted.
pub fn required_stable_features(cases: &[ContractCase]) -> Vec<Feature> {
    let set: BTreeSet<Feature> = cases
        .iter()
        .filter(|c| c.required_for_stable)
        .flat_map(|c| c.features.iter().copied())
        .collect();
    set.into_iter().collect()
}

/// Run the canonical contract cases for selected targets (default: stable
/// packs when `stable_only`, every pack otherwise).
pub fn run_contract_suite(
    registry: &PackRegistry,
    targets: Option<&[String]>,
    stable_only: bool,
) -> Result<ContractReport, CompileError> {
    let cases = contract_cases();
    let features = all_features(&cases);
    let required = required_stable_features(&cases);
    let manager = default_plugin_manager();

    let selected: Vec<String> = match targets {
        Some(list) if !list.is_empty() => list.to_vec(),
        _ => registry.targets(if stable_only { Some("stable") } else { None }),
    };

    let mut results: Vec<CaseResult> = Vec::new();
    for target in &selected {
        for case in &cases {
            let outcome = compile_source(
                case.source,
                "<contract>",
                target,
                &manager,
                registry,
                &CompileOptions::default(),
            );
            results.push(match outcome {
                Ok(_) => CaseResult {
                    case: case.name.to_string(),
                    target: target.clone(),
                    ok: true,
                    error_code: None,
                    error_message: None,
                },
                Err(err) => CaseResult {
                    case: case.name.to_string(),
                    target: target.clone(),
                    ok: false,
                    error_code: Some(err.code().to_string()),
                    error_message: Some(err.diagnostic().message.clone()),
                },
            });
        }
    }

    let mut summary: BTreeMap<String, TargetSummary> = BTreeMap::new();
    let mut feature_matrix: BTreeMap<String, TargetMatrix> = BTreeMap::new();
    let mut target_ok_flags: Vec<bool> = Vec::new();

    for target in &selected {
        let manifest = registry.get(target)?.manifest().clone();
        let target_results: Vec<&CaseResult> =
            results.iter().filter(|r| &r.target == target).collect();
        let by_case: BTreeMap<&str, &CaseResult> = target_results
            .iter()
            .map(|r| (r.case.as_str(), *r))
            .collect();

        let passed = target_results.iter().filter(|r| r.ok).count();
        let total = target_results.len();

        let mut per_feature: BTreeMap<Feature, FeatureReport> = BTreeMap::new();
        let mut contradictions: Vec<String> = Vec::new();

        for feature in &features {
            let declared = manifest
                .feature_coverage
                .get(feature)
                .copied()
                .unwrap_or(true);
            let feature_cases: Vec<&ContractCase> = cases
                .iter()
                .filter(|c| c.features.contains(feature))
                .collect();

            // A declared-supported feature is judged only on cases legal for
            // this target's whole coverage; an unsupported one must be
            // rejected anywhere it is exercised.
            let judged: Vec<&CaseResult> = if declared {
                feature_cases
                    .iter()
                    .filter(|c| {
                        c.features.iter().all(|f| {
                            manifest.feature_coverage.get(f).copied().unwrap_or(true)
                        })
                    })
                    .filter_map(|c| by_case.get(c.name).copied())
                    .collect()
            } else {
                feature_cases
                    .iter()
                    .filter_map(|c| by_case.get(c.name).copied())
                    .collect()
            };

            let pass_count = judged.iter().filter(|r| r.ok).count();
            let low001_count = judged
                .iter()
                .filter(|r| r.error_code.as_deref() == Some("LOW001"))
                .count();
            let other_fail_count = judged
                .iter()
                .filter(|r| !r.ok && r.error_code.as_deref() != Some("LOW001"))
                .count();

            let status = if judged.is_empty() {
                FeatureStatus::Unexercised
            } else if declared {
                if pass_count == judged.len() {
                    FeatureStatus::Supported
                } else if low001_count > 0 {
                    FeatureStatus::DeclaredSupportedButRejected
                } else {
                    FeatureStatus::DeclaredSupportedButFailed
                }
            } else if low001_count == judged.len() {
                FeatureStatus::UnsupportedEnforced
            } else if pass_count > 0 {
                FeatureStatus::DeclaredUnsupportedButPassed
            } else {
                FeatureStatus::DeclaredUnsupportedButFailedNonstruct
            };

            if status.is_contradiction() {
                contradictions.push(format!("{feature}:{}", status.as_str()));
            }

            per_feature.insert(
                *feature,
                FeatureReport {
                    declared_supported: declared,
                    status,
                    cases: feature_cases.iter().map(|c| c.name.to_string()).collect(),
                    pass_count,
                    low001_count,
                    other_fail_count,
                },
            );
        }

        let is_stable = manifest.stability == "stable";
        let all_cases_ok = target_results.iter().all(|r| r.ok);
        let stable_feature_ok = required.iter().all(|f| {
            per_feature
                .get(f)
                .is_some_and(|r| r.status == FeatureStatus::Supported)
        });

        let target_ok = if is_stable {
            all_cases_ok && stable_feature_ok && contradictions.is_empty()
        } else {
            contradictions.is_empty()
        };

        summary.insert(
            target.clone(),
            TargetSummary {
                passed,
                total,
                stability: manifest.stability.clone(),
                all_cases_ok,
                stable_feature_ok,
                target_ok,
            },
        );
        feature_matrix.insert(
            target.clone(),
            TargetMatrix {
                target: target.clone(),
                stability: manifest.stability.clone(),
                contradictions,
                features: per_feature,
            },
        );
        target_ok_flags.push(target_ok);
    }

    Ok(ContractReport {
        ok: target_ok_flags.iter().all(|ok| *ok),
        stable_only,
        targets: selected,
        required_stable_features: required,
        results,
        summary,
        feature_matrix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packs::build_builtin_registry;

    #[test]
    fn stable_targets_pass_the_suite() {
        let registry = build_builtin_registry().expect("registry");
        let report = run_contract_suite(&registry, None, true).expect("suite");
        assert!(report.ok, "summary: {:?}", report.summary);
        assert_eq!(report.targets, vec!["js", "python", "rust", "web"]);
        for summary in report.summary.values() {
            assert!(summary.all_cases_ok);
            assert!(summary.stable_feature_ok);
        }
    }

    #[test]
    fn experimental_targets_enforce_unsupported_features() {
        let registry = build_builtin_registry().expect("registry");
        let report =
            run_contract_suite(&registry, Some(&["go".to_string()]), false).expect("suite");
        assert!(report.ok, "matrix: {:?}", report.feature_matrix);
        let matrix = &report.feature_matrix["go"];
        assert_eq!(
            matrix.features[&Feature::TypedAnnotation].status,
            FeatureStatus::UnsupportedEnforced
        );
        assert_eq!(
            matrix.features[&Feature::Logic].status,
            FeatureStatus::UnsupportedEnforced
        );
        assert_eq!(
            matrix.features[&Feature::AtCall].status,
            FeatureStatus::UnsupportedEnforced
        );
        assert_eq!(
            matrix.features[&Feature::Loop].status,
            FeatureStatus::Supported
        );
    }

    #[test]
    fn required_stable_features_cover_the_catalog_cases() {
        let cases = contract_cases();
        let required = required_stable_features(&cases);
        assert!(required.contains(&Feature::Assignment));
        assert!(required.contains(&Feature::AtCall));
        assert_eq!(required.len(), all_features(&cases).len());
    }
}
