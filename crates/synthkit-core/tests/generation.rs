//! End-to-end generation tests against on-disk artifacts.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use synthkit_core::artifact::{read_batch, ArtifactStore};
use synthkit_core::generate::engine::artifact_columns;
use synthkit_core::generate::providers::FakerProvider;
use synthkit_core::generate::{AbortToken, ExperimentArtifacts, GenerationEngine, GenerationSettings, Value};
use synthkit_core::graph::resolve_order;
use synthkit_core::schema::types::ExperimentSchema;
use synthkit_core::SynthKitError;
use synthkit_testutil::*;

fn engine(root: &Path, workers: usize, batch_size: u64) -> GenerationEngine {
    let config = test_config(root, workers, batch_size);
    GenerationEngine::new(
        GenerationSettings::from(&config.generation),
        ArtifactStore::new(config.artifact_root()),
        Arc::new(FakerProvider),
    )
}

fn generate(
    engine: &GenerationEngine,
    schema: &ExperimentSchema,
    seed: u64,
) -> synthkit_core::Result<ExperimentArtifacts> {
    let order = resolve_order(schema)?;
    engine.generate(schema, &order.tables, &BTreeMap::new(), seed, &AbortToken::new())
}

/// All values of one column of a generated table, in row order.
fn column_values(schema: &ExperimentSchema, artifacts: &ExperimentArtifacts, table: &str, column: &str) -> Vec<Value> {
    let table_schema = schema.table(table).unwrap();
    let columns = artifact_columns(table_schema);
    let idx = columns.iter().position(|(name, _)| name == column).unwrap();
    let output = artifacts.table(table).unwrap();

    let mut values = Vec::new();
    for path in &output.artifacts {
        let mut batch = read_batch(path, &columns).unwrap();
        values.append(&mut batch[idx]);
    }
    values
}

#[test]
fn test_unique_integers_exact_for_any_pool_size() {
    let schema = unique_ints_schema("ints", 2_500);
    for workers in 1..=4 {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = generate(&engine(dir.path(), workers, 400), &schema, 11).unwrap();

        let ids = column_values(&schema, &artifacts, "items", "id");
        assert_eq!(ids.len(), 2_500, "workers={}", workers);
        let distinct: HashSet<i64> = ids.iter().filter_map(Value::as_int).collect();
        assert_eq!(distinct.len(), 2_500, "duplicates with workers={}", workers);
    }
}

#[test]
fn test_same_seed_same_rows_regardless_of_pool_size() {
    let schema = shop_schema();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let single = generate(&engine(dir_a.path(), 1, 128), &schema, 42).unwrap();
    let many = generate(&engine(dir_b.path(), 4, 128), &schema, 42).unwrap();

    for table in &schema.tables {
        for column in &table.columns {
            assert_eq!(
                column_values(&schema, &single, &table.name, &column.name),
                column_values(&schema, &many, &table.name, &column.name),
                "{}.{} differs between pool sizes",
                table.name,
                column.name
            );
        }
    }
}

#[test]
fn test_different_seeds_differ() {
    let schema = shop_schema();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let first = generate(&engine(dir_a.path(), 2, 256), &schema, 1).unwrap();
    let second = generate(&engine(dir_b.path(), 2, 256), &schema, 2).unwrap();
    assert_ne!(
        column_values(&schema, &first, "orders", "amount"),
        column_values(&schema, &second, "orders", "amount")
    );
}

#[test]
fn test_foreign_keys_draw_from_parent_pool() {
    let schema = shop_schema();
    let dir = tempfile::tempdir().unwrap();
    let artifacts = generate(&engine(dir.path(), 3, 100), &schema, 42).unwrap();

    let parents: HashSet<i64> = column_values(&schema, &artifacts, "customers", "id")
        .iter()
        .filter_map(Value::as_int)
        .collect();
    let children = column_values(&schema, &artifacts, "orders", "customer_id");

    assert_eq!(children.len(), 1_000);
    for value in &children {
        let id = value.as_int().expect("required foreign key is never NULL");
        assert!(parents.contains(&id), "orphan customer_id {}", id);
    }
}

#[test]
fn test_customers_orders_scenario() {
    let schema = shop_schema();
    let dir = tempfile::tempdir().unwrap();
    let artifacts = generate(&engine(dir.path(), 2, 10_000), &schema, 42).unwrap();

    let counts = artifacts.row_counts();
    assert_eq!(counts["customers"], 100);
    assert_eq!(counts["orders"], 1_000);
    assert_eq!(artifacts.tables[0].table, "customers");
    assert_eq!(artifacts.tables[1].table, "orders");

    let emails = column_values(&schema, &artifacts, "customers", "email");
    let distinct: HashSet<String> = emails
        .iter()
        .filter_map(|v| v.as_string().map(str::to_string))
        .collect();
    assert_eq!(distinct.len(), 100);

    for amount in column_values(&schema, &artifacts, "orders", "amount") {
        let amount = amount.as_float().unwrap();
        assert!((1.0..=500.0).contains(&amount), "amount {} out of range", amount);
    }
}

#[test]
fn test_required_cycle_rejected_before_generation() {
    match resolve_order(&cyclic_schema()) {
        Err(SynthKitError::CircularDependency { tables }) => assert_eq!(tables, "a, b"),
        other => panic!("expected CircularDependency, got {:?}", other),
    }
}

#[test]
fn test_short_date_range_exhausts_without_artifacts() {
    let schema = short_date_range_schema(20);
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path(), 2, 5);

    match generate(&engine, &schema, 7) {
        Err(SynthKitError::RangeExhaustion { table, column, .. }) => {
            assert_eq!(table, "days");
            assert_eq!(column, "day");
        }
        other => panic!("expected RangeExhaustion, got {:?}", other),
    }
    assert!(!engine.store().table_dir("calendar", "days").exists());
}

#[test]
fn test_null_rate_near_five_percent() {
    let schema = optional_column_schema(100_000);
    let dir = tempfile::tempdir().unwrap();
    let artifacts = generate(&engine(dir.path(), 4, 10_000), &schema, 99).unwrap();

    let notes = column_values(&schema, &artifacts, "events", "note");
    assert_eq!(notes.len(), 100_000);
    let nulls = notes.iter().filter(|v| v.is_null()).count();
    assert!(
        (4_000..=6_000).contains(&nulls),
        "expected ~5% NULLs, got {}",
        nulls
    );

    let ids = column_values(&schema, &artifacts, "events", "id");
    assert!(ids.iter().all(|v| !v.is_null()));
}

#[test]
fn test_unique_strings_reconciled_across_batches() {
    let schema = unique_names_schema(1_500);
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();

    let single = generate(&engine(dir_a.path(), 1, 100), &schema, 21).unwrap();
    let many = generate(&engine(dir_b.path(), 4, 100), &schema, 21).unwrap();
    assert_eq!(single.tables[0].artifacts.len(), 15);

    let names = column_values(&schema, &single, "people", "name");
    let distinct: HashSet<&str> = names.iter().filter_map(Value::as_string).collect();
    assert_eq!(distinct.len(), 1_500);
    assert!(distinct.iter().all(|n| n.chars().count() <= 60));
    assert_eq!(names, column_values(&schema, &many, "people", "name"));
}

#[test]
fn test_optional_reference_draws_from_pool_or_null() {
    let schema = optional_reference_schema(20_000);
    let dir = tempfile::tempdir().unwrap();
    let artifacts = generate(&engine(dir.path(), 3, 2_500), &schema, 8).unwrap();

    let parents: HashSet<i64> = column_values(&schema, &artifacts, "accounts", "id")
        .iter()
        .filter_map(Value::as_int)
        .collect();
    let refs = column_values(&schema, &artifacts, "transfers", "account_id");
    assert_eq!(refs.len(), 20_000);

    let nulls = refs.iter().filter(|v| v.is_null()).count();
    assert!(
        (1_600..=2_400).contains(&nulls),
        "expected ~10% NULLs, got {}",
        nulls
    );
    for id in refs.iter().filter_map(Value::as_int) {
        assert!(parents.contains(&id), "orphan account_id {}", id);
    }
}
