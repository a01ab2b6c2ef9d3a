//! # Table Plans
//!
//! A `TablePlan` is everything a worker needs to generate any batch of one
//! table: the per-column strategies, batch geometry and the run seed. It is
//! built once per table, after the table's parents have produced their key
//! pools, and shared read-only by every worker.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::config::{GenerationConfig, DEFAULT_BATCH_SIZE, DEFAULT_FK_NULL_PROBABILITY, DEFAULT_NULL_PROBABILITY};
use crate::error::Result;
use crate::generate::foreign_key::KeyPools;
use crate::generate::strategy::ValueGenerator;
use crate::generate::unique::MAX_UNIQUE_RETRIES;
use crate::schema::types::{ColumnType, TableSchema};

/// Engine settings that apply to every table of a run.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub batch_size: u64,
    pub workers: usize,
    pub null_probability: f64,
    pub fk_null_probability: f64,
    pub max_unique_retries: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: crate::config::default_worker_count(),
            null_probability: DEFAULT_NULL_PROBABILITY,
            fk_null_probability: DEFAULT_FK_NULL_PROBABILITY,
            max_unique_retries: MAX_UNIQUE_RETRIES,
        }
    }
}

impl From<&GenerationConfig> for GenerationSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            workers: config.worker_count(),
            null_probability: config.null_probability,
            fk_null_probability: config.fk_null_probability,
            max_unique_retries: MAX_UNIQUE_RETRIES,
        }
    }
}

/// How one column is generated.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub name: String,
    pub data_type: ColumnType,
    pub generator: ValueGenerator,
    /// Optional, non-unique, non-reference columns get random NULLs.
    pub inject_nulls: bool,
}

/// The plan for generating one table.
#[derive(Debug, Clone)]
pub struct TablePlan {
    pub table: String,
    pub target_rows: u64,
    pub batch_size: u64,
    pub run_seed: u64,
    pub columns: Vec<ColumnPlan>,
    pub null_probability: f64,
    pub fk_null_probability: f64,
    pub max_unique_retries: usize,
    /// Warnings discovered while planning, to be appended to the schema.
    pub warnings: Vec<String>,
}

/// One contiguous slice of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSpec {
    pub index: u64,
    /// First global row offset (inclusive).
    pub start: u64,
    /// Last global row offset (exclusive).
    pub end: u64,
    pub seed: u64,
}

impl BatchSpec {
    pub fn row_count(&self) -> usize {
        (self.end - self.start) as usize
    }
}

impl TablePlan {
    /// Build the plan for `table`.
    ///
    /// Range feasibility and foreign-key pools are checked here, so an
    /// impossible table fails before any batch work starts.
    pub fn build(
        table: &TableSchema,
        target_rows: u64,
        run_seed: u64,
        settings: &GenerationSettings,
        pools: &KeyPools,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(table.columns.len());
        let mut warnings = Vec::new();

        for column in &table.columns {
            let pool = column
                .foreign_key
                .as_ref()
                .and_then(|fk| pools.get(&fk.table, &fk.column));

            if let Some(fk) = &column.foreign_key {
                if pool.is_none() && fk.nullable && target_rows > 0 {
                    let warning = format!(
                        "{} references {}.{}, which is generated later; all values are NULL",
                        column.name, fk.table, fk.column
                    );
                    warn!("{}: {}", table.name, warning);
                    warnings.push(warning);
                }
            }

            let generator = ValueGenerator::for_column(table, column, target_rows, pool)?;
            columns.push(ColumnPlan {
                name: column.name.clone(),
                data_type: column.data_type,
                generator,
                inject_nulls: !column.required && !column.unique && column.foreign_key.is_none(),
            });
        }

        Ok(Self {
            table: table.name.clone(),
            target_rows,
            batch_size: settings.batch_size.max(1),
            run_seed,
            columns,
            null_probability: settings.null_probability,
            fk_null_probability: settings.fk_null_probability,
            max_unique_retries: settings.max_unique_retries,
            warnings,
        })
    }

    pub fn batch_count(&self) -> u64 {
        self.target_rows.div_ceil(self.batch_size)
    }

    pub fn batch(&self, index: u64) -> BatchSpec {
        let start = index * self.batch_size;
        BatchSpec {
            index,
            start,
            end: (start + self.batch_size).min(self.target_rows),
            seed: batch_seed(self.run_seed, &self.table, index),
        }
    }

    pub fn batches(&self) -> impl Iterator<Item = BatchSpec> + '_ {
        (0..self.batch_count()).map(|b| self.batch(b))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_unique_strings(&self) -> bool {
        self.columns.iter().any(|c| c.generator.is_unique_string())
    }
}

/// Seed of batch `index`: the first 8 bytes of
/// `SHA-256(run_seed ‖ table_name ‖ index)`.
pub fn batch_seed(run_seed: u64, table: &str, index: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(run_seed.to_le_bytes());
    hasher.update(table.as_bytes());
    hasher.update(index.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
