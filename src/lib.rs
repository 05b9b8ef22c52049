//! # ICL Compiler
//!
//! A source-to-source compiler for ICL, a small intent-oriented language,
//! emitting semantically equivalent programs for many target languages
//! through one shared pipeline.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! ICL Source Code
//!     |
//! [Lexer]                 -> tokens
//!     |
//! [Parser]                -> AST
//!     |
//! [Plugins/Macros]        -> expanded AST
//!     |
//! [Semantic Analyzer]     -> scopes + inferred expression types
//!     |
//! [IR Builder]            -> target-agnostic IR
//!     |
//! [Lowerer]               -> per-target Lowered Module (feature gate)
//!     |
//! [Language Pack]         -> emitted code + scaffolded output bundle
//! ```
//!
//! The Intent Graph is built from the AST in the same frontend pass (and is
//! also derivable from any lowered module) and feeds the optimizer, the
//! structural differ, and explain output.
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `lexer` | source text -> tokens |
//! | `parser` | tokens -> AST (Pratt expressions) |
//! | `plugin` | macro expansion + syntax transform seams |
//! | `semantic` | scope/type checking with gradual inference |
//! | `ir` | AST -> target-agnostic IR |
//! | `lowering` | IR -> lowered module under a pack's feature coverage |
//! | `packs` | language pack manifests, registry, builtin packs |
//! | `emit` | python/js/rust graph-walking emitters |
//! | `graph` | Intent Graph model, builder, structural diff |
//! | `optimizer` | constant folding, dead-store removal, orphan pruning |
//! | `compile` | frontend-once multi-target orchestrator |
//! | `service` | JSON method dispatch for adapters |
//! | `contract` | declared-vs-observed feature-support matrix |
//!
//! ## Usage
//!
//! ```rust
//! use icl::compile::{compile_source, default_pack_registry, default_plugin_manager, CompileOptions};
//!
//! let manager = default_plugin_manager();
//! let registry = default_pack_registry().expect("builtin packs");
//! let artifacts = compile_source(
//!     "x := 1 + 2;",
//!     "<inline>",
//!     "python",
//!     &manager,
//!     &registry,
//!     &CompileOptions::default(),
//! )
//! .expect("compile");
//! assert_eq!(artifacts.code, "x = (1 + 2)\n");
//! ```

pub mod ast;
pub mod compile;
pub mod config;
pub mod contract;
pub mod emit;
pub mod errors;
pub mod graph;
pub mod ir;
pub mod lexer;
pub mod lowering;
pub mod optimizer;
pub mod packs;
pub mod parser;
pub mod plugin;
pub mod scaffold;
pub mod semantic;
pub mod serialization;
pub mod service;
pub mod source_map;
pub mod tokens;

// Re-export the types most callers need.
pub use crate::ast::Program;
pub use crate::compile::{
    compile_file, compile_source, compile_targets, compress_source, default_pack_registry,
    default_plugin_manager, CompileArtifacts, CompileOptions, MultiTargetArtifacts,
};
pub use crate::errors::{CompileError, Diagnostic};
pub use crate::graph::{diff_graphs, IntentDiff, IntentGraph, IntentGraphBuilder};
pub use crate::ir::{IrBuilder, IrModule, IR_SCHEMA_VERSION};
pub use crate::lexer::Lexer;
pub use crate::lowering::{Feature, LoweredModule, Lowerer};
pub use crate::optimizer::{GraphOptimizer, OptimizationReport};
pub use crate::packs::{
    build_builtin_registry, LanguagePack, OutputBundle, PackManifest, PackRegistry,
};
pub use crate::parser::Parser;
pub use crate::plugin::PluginManager;
pub use crate::semantic::{SemanticAnalyzer, SemanticResult};
pub use crate::source_map::{SourceMap, SourceSpan};
pub use crate::tokens::{Token, TokenKind};
