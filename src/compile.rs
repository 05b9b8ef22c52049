//! # Compile Orchestrator
//!
//! Runs the frontend once per compile, then loops requested targets through
//! lower -> emit -> scaffold. The Intent Graph and source map derive from the
//! AST in the same frontend pass, so every target shares identical `ir` and
//! `source_map` artifacts.
//!
//! ```text
//! source -> Lexer -> Parser -> plugins -> macro expansion -> Semantic -> IR
//!        -> { per target: Lowerer -> pack.emit -> pack.scaffold } -> bundles
//! ```

use std::fs;
use std::path::Path;

use crate::ast::{Expr, ExprKind, LiteralValue, Program, Stmt, StmtKind};
use crate::errors::CompileError;
use crate::graph::{IntentGraph, IntentGraphBuilder};
use crate::ir::{IrBuilder, IrModule};
use crate::lexer::Lexer;
use crate::lowering::{lowered_to_graph, LoweredModule, Lowerer};
use crate::optimizer::{GraphOptimizer, OptimizationReport};
use crate::packs::{build_builtin_registry, EmissionContext, OutputBundle, PackRegistry};
use crate::parser::Parser;
use crate::plugin::PluginManager;
use crate::scaffold::scaffold_output;
use crate::semantic::{SemanticAnalyzer, SemanticResult};
use crate::source_map::SourceMap;
use crate::tokens::Token;

/// Pipeline output from source through semantic analysis and IR build.
pub struct FrontendArtifacts {
    pub tokens: Vec<Token>,
    pub program: Program,
    pub semantic: SemanticResult,
    pub ir: IrModule,
    pub graph: IntentGraph,
    pub source_map: SourceMap,
}

/// Single-target lowering, emission, and scaffolding output.
pub struct TargetArtifacts {
    pub target: String,
    pub lowered: LoweredModule,
    pub graph: IntentGraph,
    pub code: String,
    pub bundle: OutputBundle,
    pub optimization: Option<OptimizationReport>,
}

/// Shared frontend plus per-target emissions from one source.
pub struct MultiTargetArtifacts {
    pub tokens: Vec<Token>,
    pub program: Program,
    pub semantic: SemanticResult,
    pub ir: IrModule,
    pub source_map: SourceMap,
    /// Requested target order, deduplicated.
    pub target_order: Vec<String>,
    pub targets: std::collections::BTreeMap<String, TargetArtifacts>,
}

/// Full single-target compiler artifacts.
#[derive(Debug)]
pub struct CompileArtifacts {
    pub tokens: Vec<Token>,
    pub program: Program,
    pub semantic: SemanticResult,
    pub ir: IrModule,
    pub lowered: LoweredModule,
    pub graph: IntentGraph,
    pub source_map: SourceMap,
    pub code: String,
    pub bundle: OutputBundle,
    pub optimization: Option<OptimizationReport>,
}

/// Knobs for one compile invocation.
#[derive(Default)]
pub struct CompileOptions {
    pub optimize: bool,
    pub debug: bool,
}

/// Plugin manager with the standard macro set registered.
pub fn default_plugin_manager() -> PluginManager {
    PluginManager::with_std_macros()
}

/// Registry with built-in stable and experimental packs.
pub fn default_pack_registry() -> Result<PackRegistry, CompileError> {
    build_builtin_registry()
}

/// Compile source once and emit for multiple targets (deduplicated,
/// caller order preserved).
pub fn compile_targets(
    source: &str,
    filename: &str,
    targets: &[String],
    plugin_manager: &PluginManager,
    registry: &PackRegistry,
    options: &CompileOptions,
) -> Result<MultiTargetArtifacts, CompileError> {
    let frontend = run_frontend(source, filename, plugin_manager)?;

    let mut target_order: Vec<String> = Vec::new();
    for target in targets {
        if !target_order.contains(target) {
            target_order.push(target.clone());
        }
    }

    let mut results = std::collections::BTreeMap::new();
    let mut lowerer = Lowerer::new();
    for target in &target_order {
        let pack = registry.get(target)?;
        let manifest = pack.manifest();
        let lowered = lowerer.lower(
            &frontend.ir,
            &manifest.target,
            &manifest.feature_coverage,
        )?;

        let mut graph = lowered_to_graph(&lowered);
        let mut optimization: Option<OptimizationReport> = None;
        if options.optimize {
            let (optimized, report) = GraphOptimizer::new().optimize(&graph);
            graph = optimized;
            optimization = Some(report);
        }

        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert("filename".to_string(), filename.to_string());
        metadata.insert("source_target".to_string(), target.clone());
        let code = pack.emit(
            &lowered,
            &EmissionContext {
                target: manifest.target.clone(),
                debug: options.debug,
                metadata,
            },
        );
        let bundle = scaffold_output(pack, code, &manifest.target, options.debug);

        tracing::debug!(pack = %target, files = bundle.files.len(), "target emitted");
        results.insert(
            target.clone(),
            TargetArtifacts {
                target: target.clone(),
                lowered,
                graph,
                code: bundle.code().to_string(),
                bundle,
                optimization,
            },
        );
    }

    Ok(MultiTargetArtifacts {
        tokens: frontend.tokens,
        program: frontend.program,
        semantic: frontend.semantic,
        ir: frontend.ir,
        source_map: frontend.source_map,
        target_order,
        targets: results,
    })
}

/// Compile source for a single target.
pub fn compile_source(
    source: &str,
    filename: &str,
    target: &str,
    plugin_manager: &PluginManager,
    registry: &PackRegistry,
    options: &CompileOptions,
) -> Result<CompileArtifacts, CompileError> {
    let mut multi = compile_targets(
        source,
        filename,
        &[target.to_string()],
        plugin_manager,
        registry,
        options,
    )?;
    let Some(target_artifacts) = multi.targets.remove(target) else {
        return Err(CompileError::cli(
            "CLI999",
            format!("Internal error: target '{target}' missing from compile result."),
            "Report this as a compiler bug.",
        ));
    };

    Ok(CompileArtifacts {
        tokens: multi.tokens,
        program: multi.program,
        semantic: multi.semantic,
        ir: multi.ir,
        lowered: target_artifacts.lowered,
        graph: target_artifacts.graph,
        source_map: multi.source_map,
        code: target_artifacts.code,
        bundle: target_artifacts.bundle,
        optimization: target_artifacts.optimization,
    })
}

/// Compile an input `.icl` file for one target.
pub fn compile_file(
    input_path: &Path,
    target: &str,
    plugin_manager: &PluginManager,
    registry: &PackRegistry,
    options: &CompileOptions,
) -> Result<CompileArtifacts, CompileError> {
    let source = read_source(input_path)?;
    compile_source(
        &source,
        &input_path.display().to_string(),
        target,
        plugin_manager,
        registry,
        options,
    )
}

/// Read a source file with a CLI-tier error on failure.
pub fn read_source(path: &Path) -> Result<String, CompileError> {
    fs::read_to_string(path).map_err(|err| {
        CompileError::cli(
            "CLI001",
            format!("Failed to read input file '{}': {err}", path.display()),
            "Check the input path and file permissions.",
        )
    })
}

/// Run the pipeline through lowering for the default python target.
pub fn check_source(
    source: &str,
    filename: &str,
    plugin_manager: &PluginManager,
    registry: &PackRegistry,
) -> Result<CompileArtifacts, CompileError> {
    compile_source(
        source,
        filename,
        "python",
        plugin_manager,
        registry,
        &CompileOptions::default(),
    )
}

/// JSON-compatible explanation payload with AST, IR, lowered, graph, and
/// source map.
pub fn explain_source(
    source: &str,
    filename: &str,
    target: &str,
    plugin_manager: &PluginManager,
    registry: &PackRegistry,
) -> Result<serde_json::Value, CompileError> {
    let artifacts = compile_source(
        source,
        filename,
        target,
        plugin_manager,
        registry,
        &CompileOptions::default(),
    )?;

    Ok(serde_json::json!({
        "ast": artifacts.program.to_json(),
        "ir": artifacts.ir.to_json(),
        "lowered": artifacts.lowered.to_json(),
        "graph": artifacts.graph.to_json(),
        "source_map": artifacts.source_map.to_json(),
    }))
}

fn run_frontend(
    source: &str,
    filename: &str,
    plugin_manager: &PluginManager,
) -> Result<FrontendArtifacts, CompileError> {
    let prepared = plugin_manager.preprocess_source(source);

    let tokens = Lexer::new(&prepared, filename).tokenize()?;
    tracing::trace!(tokens = tokens.len(), "lexing complete");
    let program = Parser::new(tokens.clone()).parse_program()?;
    let program = plugin_manager.transform_program(program);
    let program = plugin_manager.expand_macros(program)?;

    let semantic = SemanticAnalyzer::new().analyze(&program)?;

    let mut graph_builder = IntentGraphBuilder::new();
    let graph = graph_builder.build(&program);
    let source_map = graph_builder.into_source_map();

    let ir = IrBuilder::new(&semantic).build(&program)?;
    tracing::debug!(
        statements = program.statements.len(),
        nodes = graph.nodes.len(),
        "frontend complete"
    );

    Ok(FrontendArtifacts {
        tokens,
        program,
        semantic,
        ir,
        graph,
        source_map,
    })
}

// ============================================================================
// Compressed form
// ============================================================================

/// Canonical compact single-line-per-statement encoding of a parsed program.
/// Output always ends with a single newline.
pub fn compress_source(source: &str, filename: &str) -> Result<String, CompileError> {
    let tokens = Lexer::new(source, filename).tokenize()?;
    let program = Parser::new(tokens).parse_program()?;
    let lines: Vec<String> = program.statements.iter().map(emit_stmt_compact).collect();
    Ok(format!("{}\n", lines.join("\n").trim()))
}

fn emit_stmt_compact(stmt: &Stmt) -> String {
    match &stmt.kind {
        StmtKind::Assignment {
            name,
            type_hint,
            value,
        } => match type_hint {
            Some(hint) => format!("{name}:{hint}:={}", emit_expr_compact(value)),
            None => format!("{name}:={}", emit_expr_compact(value)),
        },

        StmtKind::Expression { expr } => emit_expr_compact(expr),

        StmtKind::Return { value } => match value {
            Some(expr) => format!("ret {}", emit_expr_compact(expr)),
            None => "ret".to_string(),
        },

        StmtKind::Loop {
            iterator,
            start,
            end,
            body,
        } => {
            let body_src: Vec<String> = body.iter().map(emit_stmt_compact).collect();
            format!(
                "loop {iterator} in {}..{}{{{}}}",
                emit_expr_compact(start),
                emit_expr_compact(end),
                body_src.join(";")
            )
        }

        StmtKind::If {
            condition,
            then_block,
            else_block,
        } => {
            let then_src: Vec<String> = then_block.iter().map(emit_stmt_compact).collect();
            let else_src: Vec<String> = else_block.iter().map(emit_stmt_compact).collect();
            if else_src.is_empty() {
                format!(
                    "if {}?{{{}}}",
                    emit_expr_compact(condition),
                    then_src.join(";")
                )
            } else {
                format!(
                    "if {}?{{{}}}:{{{}}}",
                    emit_expr_compact(condition),
                    then_src.join(";"),
                    else_src.join(";")
                )
            }
        }

        StmtKind::FunctionDef {
            name,
            params,
            body,
            expr_body,
            return_type,
        } => {
            let param_src: Vec<String> = params
                .iter()
                .map(|p| match &p.type_hint {
                    Some(hint) => format!("{}:{hint}", p.name),
                    None => p.name.clone(),
                })
                .collect();
            let suffix = return_type
                .as_ref()
                .map(|t| format!(":{t}"))
                .unwrap_or_default();
            if let Some(expr) = expr_body {
                return format!(
                    "fn {name}({}){suffix}=>{}",
                    param_src.join(","),
                    emit_expr_compact(expr)
                );
            }
            let body_src: Vec<String> = body.iter().map(emit_stmt_compact).collect();
            format!(
                "fn {name}({}){suffix}{{{}}}",
                param_src.join(","),
                body_src.join(";")
            )
        }

        StmtKind::Macro { name, args } => {
            let arg_src: Vec<String> = args.iter().map(emit_expr_compact).collect();
            format!("#{name}({})", arg_src.join(","))
        }
    }
}

fn emit_expr_compact(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Literal { value } => match value {
            LiteralValue::Bool(true) => "true".to_string(),
            LiteralValue::Bool(false) => "false".to_string(),
            LiteralValue::Str(s) => format!("\"{s}\""),
            LiteralValue::Int(i) => i.to_string(),
            LiteralValue::Float(f) => {
                serde_json::to_string(&serde_json::json!(f)).unwrap_or_else(|_| f.to_string())
            }
        },

        ExprKind::Identifier { name } => name.clone(),

        ExprKind::Unary { op, operand } => format!("{}{}", op.as_str(), emit_expr_compact(operand)),

        ExprKind::Binary { left, op, right } => format!(
            "({}{}{})",
            emit_expr_compact(left),
            op.as_str(),
            emit_expr_compact(right)
        ),

        ExprKind::Call {
            callee,
            args,
            at_prefixed,
        } => {
            let prefix = if *at_prefixed && matches!(callee.kind, ExprKind::Identifier { .. }) {
                "@"
            } else {
                ""
            };
            let arg_src: Vec<String> = args.iter().map(emit_expr_compact).collect();
            format!(
                "{prefix}{}({})",
                emit_expr_compact(callee),
                arg_src.join(",")
            )
        }

        ExprKind::Lambda {
            params,
            body,
            return_type,
        } => {
            let param_src: Vec<String> = params
                .iter()
                .map(|p| match &p.type_hint {
                    Some(hint) => format!("{}:{hint}", p.name),
                    None => p.name.clone(),
                })
                .collect();
            let suffix = return_type
                .as_ref()
                .map(|t| format!(":{t}"))
                .unwrap_or_default();
            format!(
                "lam({}){suffix}=>{}",
                param_src.join(","),
                emit_expr_compact(body)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress(source: &str) -> String {
        compress_source(source, "<test>").expect("compress")
    }

    #[test]
    fn compact_assignment_and_binary() {
        assert_eq!(compress("x := 1 + 2;"), "x:=(1+2)\n");
    }

    #[test]
    fn compact_typed_assignment() {
        assert_eq!(compress("v:Num := 1;"), "v:Num:=1\n");
    }

    #[test]
    fn compact_if_else() {
        assert_eq!(
            compress("if x > 1 ? { y := 1; } : { y := 2; }"),
            "if (x>1)?{y:=1}:{y:=2}\n"
        );
    }

    #[test]
    fn compact_loop() {
        assert_eq!(
            compress("loop i in 0..3 { s := s + i; }"),
            "loop i in 0..3{s:=(s+i)}\n"
        );
    }

    #[test]
    fn compact_fn_forms() {
        assert_eq!(
            compress("fn add(a:Num, b:Num):Num => a + b;"),
            "fn add(a:Num,b:Num):Num=>(a+b)\n"
        );
        assert_eq!(
            compress("fn f() { ret 1; }"),
            "fn f(){ret 1}\n"
        );
    }

    #[test]
    fn compact_at_call_and_macro() {
        assert_eq!(compress("z := @inc(1);"), "z:=@inc(1)\n");
        assert_eq!(compress("#echo(1, 2);"), "#echo(1,2)\n");
    }

    #[test]
    fn compact_string_requotes() {
        assert_eq!(compress("s := \"hello\";"), "s:=\"hello\"\n");
    }

    #[test]
    fn ends_with_single_newline() {
        let out = compress("x := 1; y := 2;");
        assert!(out.ends_with('\n'));
        assert!(!out.ends_with("\n\n"));
        assert_eq!(out, "x:=1\ny:=2\n");
    }
}
