//! # Unique String Enforcement
//!
//! Numeric, temporal and UUID unique columns are collision-free by
//! construction. Strings are not: each batch keeps a local set while it is
//! generated, and the driver then reconciles batches against a table-wide
//! `UniqueLedger` in batch-index order. Redraws during reconciliation use an
//! RNG seeded from the batch seed, column and row, so the result does not
//! depend on which worker finished first.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

use crate::error::{Result, SynthKitError};
use crate::generate::batch::GeneratedBatch;
use crate::generate::plan::TablePlan;
use crate::generate::providers::RealisticValueProvider;
use crate::generate::strategy::{StringSpec, ValueGenerator};
use crate::generate::value::Value;

/// Maximum attempts to find an unused value for one row.
pub const MAX_UNIQUE_RETRIES: usize = 1000;

/// After this many collisions, candidates are widened with a numeric tag.
const WIDEN_AFTER: usize = 10;

/// Table-wide record of unique string values, keyed by column name.
pub struct UniqueLedger {
    seen: HashMap<String, HashSet<String>>,
    pub max_retries: usize,
}

impl UniqueLedger {
    pub fn new() -> Self {
        Self {
            seen: HashMap::new(),
            max_retries: MAX_UNIQUE_RETRIES,
        }
    }

    /// Record a value. Returns false if it was already present.
    pub fn try_insert(&mut self, column: &str, key: &str) -> bool {
        let set = self.seen.entry(column.to_string()).or_default();
        if set.contains(key) {
            return false;
        }
        set.insert(key.to_string());
        true
    }

    pub fn contains(&self, column: &str, key: &str) -> bool {
        self.seen.get(column).is_some_and(|s| s.contains(key))
    }

    /// Get the number of values tracked for a column.
    pub fn count(&self, column: &str) -> usize {
        self.seen.get(column).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for UniqueLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw a string that `is_taken` rejects fewer than `max_retries` times.
pub fn draw_unique<F>(
    spec: &StringSpec,
    rng: &mut StdRng,
    provider: &dyn RealisticValueProvider,
    max_retries: usize,
    is_taken: F,
) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    for attempt in 0..max_retries {
        let mut candidate = spec.draw(rng, provider);
        if attempt >= WIDEN_AFTER {
            candidate = spec.widen(candidate, rng);
        }
        if !is_taken(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Reconcile one batch's unique string columns against the ledger.
///
/// Must be called for batches in index order.
pub fn reconcile_batch(
    ledger: &mut UniqueLedger,
    plan: &TablePlan,
    batch: &mut GeneratedBatch,
    seed: u64,
    provider: &dyn RealisticValueProvider,
) -> Result<()> {
    for (col_idx, column) in plan.columns.iter().enumerate() {
        let ValueGenerator::UniqueString(spec) = &column.generator else {
            continue;
        };

        for (row, value) in batch.columns[col_idx].iter_mut().enumerate() {
            let key = value.to_unique_key();
            if ledger.try_insert(&column.name, &key) {
                continue;
            }

            let global_row = batch.start + row as u64;
            let mut rng = StdRng::seed_from_u64(redraw_seed(seed, &column.name, global_row));
            let replacement = draw_unique(spec, &mut rng, provider, ledger.max_retries, |c| {
                ledger.contains(&column.name, c)
            })
            .ok_or_else(|| SynthKitError::UniqueValueExhaustion {
                table: plan.table.clone(),
                column: column.name.clone(),
                row_index: global_row,
                max_retries: ledger.max_retries,
            })?;

            ledger.try_insert(&column.name, &replacement);
            *value = Value::String(replacement.into());
        }
    }
    Ok(())
}

fn redraw_seed(batch_seed: u64, column: &str, row: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(batch_seed.to_le_bytes());
    hasher.update(column.as_bytes());
    hasher.update(row.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::foreign_key::KeyPools;
    use crate::generate::plan::GenerationSettings;
    use crate::generate::providers::FakerProvider;
    use crate::schema::types::{ColumnSchema, ColumnType, TableSchema};

    fn handles_plan() -> TablePlan {
        let table = TableSchema::new("users", 4).with_column(
            ColumnSchema::new("handle", ColumnType::VarChar)
                .unique()
                .length(8),
        );
        TablePlan::build(&table, 4, 42, &GenerationSettings::default(), &KeyPools::new()).unwrap()
    }

    fn handles(index: u64, values: [&'static str; 2]) -> GeneratedBatch {
        GeneratedBatch {
            table: "users".to_string(),
            index,
            start: index * 2,
            end: index * 2 + 2,
            columns: vec![values.iter().map(|v| Value::String((*v).into())).collect()],
        }
    }

    fn reconcile_all(ledger: &mut UniqueLedger, plan: &TablePlan) -> Result<Vec<GeneratedBatch>> {
        let mut batches = vec![handles(0, ["ada", "bob"]), handles(1, ["ada", "cy"])];
        for batch in &mut batches {
            let seed = plan.batch(batch.index).seed;
            reconcile_batch(ledger, plan, batch, seed, &FakerProvider)?;
        }
        Ok(batches)
    }

    #[test]
    fn test_reconcile_replaces_later_duplicates() {
        let plan = handles_plan();
        let mut ledger = UniqueLedger::new();
        let batches = reconcile_all(&mut ledger, &plan).unwrap();

        // The earlier batch keeps its values; only the repeat is redrawn.
        assert_eq!(batches[0], handles(0, ["ada", "bob"]));
        let redrawn = batches[1].columns[0][0].as_string().unwrap().to_string();
        assert!(!["ada", "bob", "cy"].contains(&redrawn.as_str()), "{}", redrawn);
        assert!(redrawn.chars().count() <= 8);
        assert_eq!(batches[1].columns[0][1], Value::String("cy".into()));
        assert_eq!(ledger.count("handle"), 4);

        // Redraws depend only on the seed and position.
        let again = reconcile_all(&mut UniqueLedger::new(), &plan).unwrap();
        assert_eq!(again, batches);
    }

    #[test]
    fn test_reconcile_reports_global_row_on_exhaustion() {
        let plan = handles_plan();
        let mut ledger = UniqueLedger::new();
        ledger.max_retries = 0;
        match reconcile_all(&mut ledger, &plan) {
            Err(SynthKitError::UniqueValueExhaustion {
                table,
                column,
                row_index,
                ..
            }) => {
                assert_eq!(table, "users");
                assert_eq!(column, "handle");
                assert_eq!(row_index, 2);
            }
            other => panic!("expected UniqueValueExhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_unique_tracking() {
        let mut ledger = UniqueLedger::new();

        assert!(ledger.try_insert("email", "test@example.com"));
        // Same value should fail
        assert!(!ledger.try_insert("email", "test@example.com"));
        // Columns are tracked separately
        assert!(ledger.try_insert("username", "test@example.com"));
        assert_eq!(ledger.count("email"), 1);
    }

    #[test]
    fn test_draw_unique_gives_up() {
        let spec = StringSpec {
            rule: None,
            length: Some(1),
            fixed: false,
            prose: false,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let result = draw_unique(&spec, &mut rng, &FakerProvider, 50, |_| true);
        assert!(result.is_none());
    }

    #[test]
    fn test_draw_unique_avoids_taken_values() {
        let spec = StringSpec {
            rule: Some("color".to_string()),
            length: None,
            fixed: false,
            prose: false,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let taken = ["red", "blue", "green", "yellow", "purple", "orange", "black", "white"];
        let result = draw_unique(&spec, &mut rng, &FakerProvider, 100, |c| taken.contains(&c));
        // Only widened candidates can escape the eight colors.
        let value = result.unwrap();
        assert!(value.contains('-'), "{}", value);
    }

    #[test]
    fn test_redraw_seed_is_stable() {
        assert_eq!(redraw_seed(42, "email", 7), redraw_seed(42, "email", 7));
        assert_ne!(redraw_seed(42, "email", 7), redraw_seed(42, "email", 8));
    }
}
