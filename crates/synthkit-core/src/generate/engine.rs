//! # Generation Engine
//!
//! Drives an experiment's tables through the parallel driver in resolver
//! order, threading parent key pools from one table to the next. Every
//! table's strategies are checked for range feasibility before the first
//! batch of the first table is generated, so an impossible schema leaves no
//! artifacts behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::artifact::{ArtifactColumn, ArtifactStore};
use crate::error::{Result, SynthKitError};
use crate::generate::driver::{AbortToken, ParallelDriver, TableOutput};
use crate::generate::foreign_key::{referenced_columns, KeyPoolAccumulator, KeyPools};
use crate::generate::plan::{GenerationSettings, TablePlan};
use crate::generate::providers::RealisticValueProvider;
use crate::generate::strategy::ValueGenerator;
use crate::schema::types::{ExperimentSchema, TableSchema};

/// Everything a generation run produced.
#[derive(Debug, Clone)]
pub struct ExperimentArtifacts {
    pub experiment: String,
    pub seed: u64,
    /// Per-table outputs in generation order.
    pub tables: Vec<TableOutput>,
    /// `(table, warning)` pairs discovered while planning.
    pub warnings: Vec<(String, String)>,
}

impl ExperimentArtifacts {
    pub fn row_counts(&self) -> BTreeMap<String, u64> {
        self.tables.iter().map(|t| (t.table.clone(), t.rows)).collect()
    }

    pub fn table(&self, name: &str) -> Option<&TableOutput> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// The columns of a table as stored in its artifacts.
pub fn artifact_columns(table: &TableSchema) -> Vec<ArtifactColumn> {
    table
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.data_type))
        .collect()
}

/// Effective row count of a table after overrides.
pub fn target_rows(table: &TableSchema, row_overrides: &BTreeMap<String, u64>) -> u64 {
    row_overrides
        .get(&table.name)
        .copied()
        .unwrap_or(table.target_rows)
}

pub struct GenerationEngine {
    settings: GenerationSettings,
    store: ArtifactStore,
    provider: Arc<dyn RealisticValueProvider>,
}

impl GenerationEngine {
    pub fn new(
        settings: GenerationSettings,
        store: ArtifactStore,
        provider: Arc<dyn RealisticValueProvider>,
    ) -> Self {
        Self {
            settings,
            store,
            provider,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Generate every table of `schema` in `order`.
    pub fn generate(
        &self,
        schema: &ExperimentSchema,
        order: &[String],
        row_overrides: &BTreeMap<String, u64>,
        seed: u64,
        abort: &AbortToken,
    ) -> Result<ExperimentArtifacts> {
        let tables = order
            .iter()
            .map(|name| {
                schema.table(name).ok_or_else(|| SynthKitError::SchemaValidation {
                    experiment: schema.name.clone(),
                    message: format!("generation order names unknown table '{}'", name),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        preflight(&tables, row_overrides)?;

        let driver = ParallelDriver::new(&schema.name, self.settings.workers, abort.clone());
        let mut pools = KeyPools::new();
        let mut outputs = Vec::with_capacity(tables.len());
        let mut warnings = Vec::new();

        for table in tables {
            driver.check_abort(&format!("table {}", table.name))?;

            let rows = target_rows(table, row_overrides);
            let plan = TablePlan::build(table, rows, seed, &self.settings, &pools)?;
            warnings.extend(plan.warnings.iter().map(|w| (table.name.clone(), w.clone())));

            let columns = artifact_columns(table);
            let referenced: Vec<(usize, String)> = referenced_columns(schema, &table.name)
                .into_iter()
                .filter_map(|name| plan.column_index(&name).map(|idx| (idx, name)))
                .collect();
            let mut accumulator = KeyPoolAccumulator::new(&table.name, referenced, rows);

            let output = driver.run_table(
                &plan,
                &columns,
                self.provider.as_ref(),
                &self.store,
                &mut accumulator,
            )?;
            accumulator.finish(&mut pools);

            info!(
                "Generated {} rows for {}.{} in {} batches",
                output.rows,
                schema.name,
                table.name,
                output.artifacts.len()
            );
            outputs.push(output);
        }

        Ok(ExperimentArtifacts {
            experiment: schema.name.clone(),
            seed,
            tables: outputs,
            warnings,
        })
    }
}

/// Check every non-reference column's strategy up front. Foreign keys are
/// checked when their table is planned, once parent pools exist.
fn preflight(tables: &[&TableSchema], row_overrides: &BTreeMap<String, u64>) -> Result<()> {
    for table in tables {
        let rows = target_rows(table, row_overrides);
        for column in table.columns.iter().filter(|c| c.foreign_key.is_none()) {
            ValueGenerator::for_column(table, column, rows, None)?;
        }
    }
    Ok(())
}
