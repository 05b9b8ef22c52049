//! # ICL Command-Line Front-End
//!
//! Thin CLI over the compiler library: compile/check/explain/compress/diff
//! plus pack listing and the contract suite.
//!
//! ```bash
//! icl compile program.icl --target python -o out.py
//! icl compile --code "x := 1 + 2;" --target js
//! icl compile program.icl --target web -o site/
//! icl check --code "fn add(a,b) => a + b;"
//! icl diff before.json after.json
//! icl contract --all
//! ```
//!
//! Exit codes: 0 success, 1 compiler error, 2 usage error, 3 internal error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use icl::compile::{
    compile_source, compress_source, default_pack_registry, default_plugin_manager,
    explain_source, read_source, CompileOptions,
};
use icl::config::IclConfig;
use icl::contract::run_contract_suite;
use icl::errors::{CompileError, Diagnostic};
use icl::graph::diff_graphs;
use icl::scaffold::write_bundle;
use icl::serialization::{graph_from_json, write_graph, write_source_map};

#[derive(Parser)]
#[command(name = "icl", version, about = "ICL compiler and tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SourceArgs {
    /// Input .icl file
    input: Option<PathBuf>,

    /// Inline ICL source string
    #[arg(long)]
    code: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Compile ICL source to a target language
    Compile {
        #[command(flatten)]
        source: SourceArgs,

        /// Target pack name (e.g. python/js/rust/web)
        #[arg(long)]
        target: Option<String>,

        /// Output file or directory path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write intent graph JSON
        #[arg(long)]
        emit_graph: Option<PathBuf>,

        /// Write source map JSON
        #[arg(long)]
        emit_sourcemap: Option<PathBuf>,

        /// Enable graph optimizations
        #[arg(long)]
        optimize: bool,

        /// Emit debug metrics to stderr
        #[arg(long)]
        debug: bool,
    },

    /// Validate source through semantic analysis and lowering
    Check {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Print AST + IR + lowered + Intent Graph JSON
    Explain {
        #[command(flatten)]
        source: SourceArgs,

        /// Target pack used for the lowered form
        #[arg(long, default_value = "python")]
        target: String,
    },

    /// Print canonical compact ICL encoding
    Compress {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Diff two serialized Intent Graph JSON files
    Diff {
        /// Path to previous graph JSON
        before: PathBuf,
        /// Path to next graph JSON
        after: PathBuf,
    },

    /// List registered targets with stability
    Targets,

    /// Run the pack contract suite
    Contract {
        /// Include experimental targets
        #[arg(long)]
        all: bool,
    },
}

fn main() -> ExitCode {
    let config = IclConfig::load().unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone())),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let diag = err.diagnostic();
            eprintln!("{}", diag.render());
            if matches!(err, CompileError::Cli(_) | CompileError::Service(_)) {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

fn run(cli: Cli, config: &IclConfig) -> Result<(), CompileError> {
    match cli.command {
        Command::Compile {
            source,
            target,
            output,
            emit_graph,
            emit_sourcemap,
            optimize,
            debug,
        } => {
            let (text, filename) = resolve_source(&source)?;
            let target = target.unwrap_or_else(|| config.compile.default_target.clone());
            let manager = default_plugin_manager();
            let registry = default_pack_registry()?;
            let options = CompileOptions {
                optimize: optimize || config.compile.optimize,
                debug,
            };

            let artifacts =
                compile_source(&text, &filename, &target, &manager, &registry, &options)?;

            if let Some(path) = emit_graph {
                write_graph(&artifacts.graph, &path)?;
            }
            if let Some(path) = emit_sourcemap {
                write_source_map(&artifacts.source_map, &path)?;
            }

            if debug {
                eprintln!(
                    "debug: tokens={} nodes={} edges={}",
                    artifacts.tokens.len(),
                    artifacts.graph.nodes.len(),
                    artifacts.graph.edges.len()
                );
                if let Some(report) = &artifacts.optimization {
                    eprintln!(
                        "debug: folded={} dead_assignments={}",
                        report.folded_operations, report.removed_assignments
                    );
                }
            }

            match output {
                Some(path) => {
                    write_bundle(&artifacts.bundle, &path)?;
                }
                None => print!("{}", artifacts.code),
            }
            Ok(())
        }

        Command::Check { source } => {
            let (text, filename) = resolve_source(&source)?;
            let manager = default_plugin_manager();
            let registry = default_pack_registry()?;
            icl::compile::check_source(&text, &filename, &manager, &registry)?;
            println!("OK");
            Ok(())
        }

        Command::Explain { source, target } => {
            let (text, filename) = resolve_source(&source)?;
            let manager = default_plugin_manager();
            let registry = default_pack_registry()?;
            let payload = explain_source(&text, &filename, &target, &manager, &registry)?;
            println!("{}", pretty(&payload));
            Ok(())
        }

        Command::Compress { source } => {
            let (text, filename) = resolve_source(&source)?;
            print!("{}", compress_source(&text, &filename)?);
            Ok(())
        }

        Command::Diff { before, after } => {
            let before_graph = graph_from_json(&read_source(&before)?)?;
            let after_graph = graph_from_json(&read_source(&after)?)?;
            let diff = diff_graphs(&before_graph, &after_graph);
            println!("{}", pretty(&serde_json::json!(diff)));
            Ok(())
        }

        Command::Targets => {
            let registry = default_pack_registry()?;
            for manifest in registry.manifests(None) {
                println!(
                    "{:<12} {:<12} v{} [{}]",
                    manifest.target,
                    manifest.stability,
                    manifest.version,
                    manifest.aliases.join(", ")
                );
            }
            Ok(())
        }

        Command::Contract { all } => {
            let registry = default_pack_registry()?;
            let report = run_contract_suite(&registry, None, !all)?;
            println!("{}", pretty(&serde_json::json!(report)));
            if report.ok {
                Ok(())
            } else {
                Err(CompileError::cli(
                    "CLI020",
                    "Contract suite reported contradictions.".to_string(),
                    "Inspect the feature matrix above.",
                ))
            }
        }
    }
}

fn resolve_source(args: &SourceArgs) -> Result<(String, String), CompileError> {
    match (&args.input, &args.code) {
        (Some(_), Some(_)) => Err(usage_error(
            "Use either input file path or --code, not both.",
        )),
        (Some(path), None) => Ok((read_source(path)?, display_path(path))),
        (None, Some(code)) => Ok((code.clone(), "<inline>".to_string())),
        (None, None) => Err(usage_error(
            "No source provided. Pass input file path or --code.",
        )),
    }
}

fn usage_error(message: &str) -> CompileError {
    CompileError::Cli(Diagnostic::new(
        "CLI001",
        message.to_string(),
        None,
        "Run icl --help for usage.",
    ))
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
