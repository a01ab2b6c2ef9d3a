//! Benchmarks for the generation engine: the core hot path.
//!
//! Measures rows-per-second throughput of `GenerationEngine::generate`
//! (including Parquet artifact writes) across table sizes, worker counts
//! and a parent/child foreign key pair.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;
use std::sync::Arc;

use synthkit_core::artifact::ArtifactStore;
use synthkit_core::generate::providers::FakerProvider;
use synthkit_core::generate::{AbortToken, GenerationEngine, GenerationSettings};
use synthkit_core::graph::resolve_order;
use synthkit_core::schema::types::ExperimentSchema;
use synthkit_testutil::{shop_schema, test_config, unique_ints_schema};

fn engine(root: &std::path::Path, workers: usize) -> GenerationEngine {
    let config = test_config(root, workers, 5_000);
    GenerationEngine::new(
        GenerationSettings::from(&config.generation),
        ArtifactStore::new(config.artifact_root()),
        Arc::new(FakerProvider),
    )
}

fn run(engine: &GenerationEngine, schema: &ExperimentSchema, overrides: &BTreeMap<String, u64>) {
    let order = resolve_order(schema).unwrap();
    engine
        .generate(schema, &order.tables, overrides, 42, &AbortToken::new())
        .unwrap();
}

fn bench_single_table_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/single_table");
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), 4);

    for row_count in [1_000u64, 10_000, 100_000] {
        let schema = unique_ints_schema("bench", row_count);
        group.throughput(Throughput::Elements(row_count));
        group.bench_with_input(BenchmarkId::new("rows", row_count), &schema, |b, schema| {
            b.iter(|| run(&engine, schema, &BTreeMap::new()));
        });
    }
    group.finish();
}

fn bench_worker_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/workers");
    let schema = unique_ints_schema("bench", 50_000);

    for workers in [1usize, 2, 4, 8] {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), workers);
        group.throughput(Throughput::Elements(50_000));
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, _| {
            b.iter(|| run(&engine, &schema, &BTreeMap::new()));
        });
    }
    group.finish();
}

fn bench_fk_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/foreign_keys");
    let schema = shop_schema();
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), 4);

    // 100 customers + varying order counts
    for order_count in [1_000u64, 10_000, 50_000] {
        let overrides: BTreeMap<String, u64> =
            [("orders".to_string(), order_count)].into_iter().collect();
        group.throughput(Throughput::Elements(100 + order_count));
        group.bench_with_input(
            BenchmarkId::new("orders", order_count),
            &overrides,
            |b, overrides| {
                b.iter(|| run(&engine, &schema, overrides));
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_table_generation,
    bench_worker_count,
    bench_fk_generation
);
criterion_main!(benches);
