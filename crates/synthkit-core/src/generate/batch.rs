use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SynthKitError};
use crate::generate::plan::{BatchSpec, TablePlan};
use crate::generate::providers::RealisticValueProvider;
use crate::generate::strategy::ValueGenerator;
use crate::generate::unique::draw_unique;
use crate::generate::value::Value;

/// Column-major values for one contiguous slice of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedBatch {
    pub table: String,
    pub index: u64,
    /// First global row offset (inclusive).
    pub start: u64,
    /// Last global row offset (exclusive).
    pub end: u64,
    /// One vector per planned column, each `end - start` long.
    pub columns: Vec<Vec<Value>>,
}

impl GeneratedBatch {
    pub fn row_count(&self) -> usize {
        (self.end - self.start) as usize
    }

    /// Values of row `row` (batch-relative), in column order.
    pub fn row(&self, row: usize) -> impl Iterator<Item = &Value> + '_ {
        self.columns.iter().map(move |c| &c[row])
    }
}

/// Generate one batch.
///
/// All randomness comes from a single RNG seeded with the batch seed, and
/// rows are produced in offset order, so the output depends only on the plan
/// and the batch spec. Unique strings are made unique within the batch here;
/// cross-batch uniqueness is the driver's job.
pub fn generate_batch(
    plan: &TablePlan,
    spec: BatchSpec,
    provider: &dyn RealisticValueProvider,
) -> Result<GeneratedBatch> {
    let rows = spec.row_count();
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut columns: Vec<Vec<Value>> = plan
        .columns
        .iter()
        .map(|_| Vec::with_capacity(rows))
        .collect();
    let mut local_sets: Vec<HashSet<String>> = plan.columns.iter().map(|_| HashSet::new()).collect();

    for offset in spec.start..spec.end {
        for (idx, column) in plan.columns.iter().enumerate() {
            let value = match &column.generator {
                ValueGenerator::UniqueString(string_spec) => {
                    let seen = &local_sets[idx];
                    let drawn = draw_unique(
                        string_spec,
                        &mut rng,
                        provider,
                        plan.max_unique_retries,
                        |c| seen.contains(c),
                    )
                    .ok_or_else(|| SynthKitError::UniqueValueExhaustion {
                        table: plan.table.clone(),
                        column: column.name.clone(),
                        row_index: offset,
                        max_retries: plan.max_unique_retries,
                    })?;
                    local_sets[idx].insert(drawn.clone());
                    Value::String(drawn.into())
                }
                generator => {
                    let value =
                        generator.generate(&mut rng, provider, offset, plan.fk_null_probability);
                    if column.inject_nulls && rng.random_bool(plan.null_probability) {
                        Value::Null
                    } else {
                        value
                    }
                }
            };
            columns[idx].push(value);
        }
    }

    Ok(GeneratedBatch {
        table: plan.table.clone(),
        index: spec.index,
        start: spec.start,
        end: spec.end,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::foreign_key::KeyPools;
    use crate::generate::plan::GenerationSettings;
    use crate::generate::providers::FakerProvider;
    use crate::schema::types::*;

    fn plan(table: &TableSchema, batch_size: u64) -> TablePlan {
        let settings = GenerationSettings {
            batch_size,
            workers: 1,
            ..Default::default()
        };
        TablePlan::build(table, table.target_rows, 42, &settings, &KeyPools::new()).unwrap()
    }

    fn users(rows: u64) -> TableSchema {
        TableSchema::new("users", rows)
            .with_column(ColumnSchema::new("id", ColumnType::Integer).unique())
            .with_column(ColumnSchema::new("handle", ColumnType::VarChar).unique().length(3))
            .with_column(ColumnSchema::new("bio", ColumnType::Text).optional())
    }

    #[test]
    fn test_batch_shape_and_offsets() {
        let plan = plan(&users(25), 10);
        let batch = generate_batch(&plan, plan.batch(2), &FakerProvider).unwrap();

        assert_eq!(batch.row_count(), 5);
        assert_eq!(batch.columns.len(), 3);
        assert!(batch.columns.iter().all(|c| c.len() == 5));
        assert_eq!(batch.columns[0][0], Value::Int(21));
        assert_eq!(batch.row(4).next(), Some(&Value::Int(25)));
    }

    #[test]
    fn test_batch_is_deterministic() {
        let plan = plan(&users(100), 50);
        let a = generate_batch(&plan, plan.batch(1), &FakerProvider).unwrap();
        let b = generate_batch(&plan, plan.batch(1), &FakerProvider).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unique_strings_unique_within_batch() {
        let plan = plan(&users(2_000), 2_000);
        let batch = generate_batch(&plan, plan.batch(0), &FakerProvider).unwrap();
        let handles: HashSet<String> = batch.columns[1].iter().map(|v| v.to_unique_key()).collect();
        assert_eq!(handles.len(), 2_000);
    }

    #[test]
    fn test_unique_string_exhaustion_names_column() {
        // A single character drawn from 62 symbols, and truncation undoes widening.
        let table = TableSchema::new("tags", 100)
            .with_column(ColumnSchema::new("code", ColumnType::Char).unique().length(1));
        let plan = plan(&table, 100);
        match generate_batch(&plan, plan.batch(0), &FakerProvider) {
            Err(SynthKitError::UniqueValueExhaustion { column, .. }) => assert_eq!(column, "code"),
            other => panic!("expected UniqueValueExhaustion, got {:?}", other.map(|b| b.row_count())),
        }
    }
}
