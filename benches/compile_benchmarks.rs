//! End-to-end compile benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use icl::compile::{
    compile_source, compile_targets, default_pack_registry, default_plugin_manager,
    CompileOptions,
};

const FACTORIAL: &str =
    "fn fact(n:Num):Num { if n <= 1 ? { ret 1; } : { ret n * @fact(n - 1); } } @print(@fact(5));";

fn bench_single_target(c: &mut Criterion) {
    let manager = default_plugin_manager();
    let registry = default_pack_registry().expect("registry");

    c.bench_function("compile_factorial_python", |b| {
        b.iter(|| {
            compile_source(
                black_box(FACTORIAL),
                "<bench>",
                "python",
                &manager,
                &registry,
                &CompileOptions::default(),
            )
            .expect("compile")
        });
    });

    c.bench_function("compile_factorial_rust_optimized", |b| {
        b.iter(|| {
            compile_source(
                black_box(FACTORIAL),
                "<bench>",
                "rust",
                &manager,
                &registry,
                &CompileOptions {
                    optimize: true,
                    debug: false,
                },
            )
            .expect("compile")
        });
    });
}

fn bench_multi_target(c: &mut Criterion) {
    let manager = default_plugin_manager();
    let registry = default_pack_registry().expect("registry");
    let targets: Vec<String> = ["python", "js", "rust", "web"]
        .iter()
        .map(|t| (*t).to_string())
        .collect();

    c.bench_function("compile_factorial_all_stable_targets", |b| {
        b.iter(|| {
            compile_targets(
                black_box(FACTORIAL),
                "<bench>",
                &targets,
                &manager,
                &registry,
                &CompileOptions::default(),
            )
            .expect("compile")
        });
    });
}

criterion_group!(benches, bench_single_target, bench_multi_target);
criterion_main!(benches);
