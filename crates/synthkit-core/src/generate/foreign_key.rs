//! # Foreign Key Value Pools
//!
//! Parent tables are generated first (resolver order), and the values of
//! their unique columns that some foreign key references are collected here.
//! Child tables then sample from the pool. Pools are frozen into
//! `Arc<Vec<Value>>` once the parent table finishes, so workers share them
//! without copying or locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::generate::batch::GeneratedBatch;
use crate::generate::value::Value;
use crate::schema::types::ExperimentSchema;

/// Frozen pools keyed by `(table, column)`.
#[derive(Debug, Clone, Default)]
pub struct KeyPools {
    pools: HashMap<(String, String), Arc<Vec<Value>>>,
}

impl KeyPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table_name: &str, column_name: &str) -> Option<Arc<Vec<Value>>> {
        self.pools
            .get(&(table_name.to_string(), column_name.to_string()))
            .cloned()
    }

    pub fn insert(&mut self, table_name: &str, column_name: &str, values: Vec<Value>) {
        self.pools.insert(
            (table_name.to_string(), column_name.to_string()),
            Arc::new(values),
        );
    }

    /// Get the number of values in a pool.
    pub fn pool_size(&self, table_name: &str, column_name: &str) -> usize {
        self.pools
            .get(&(table_name.to_string(), column_name.to_string()))
            .map(|p| p.len())
            .unwrap_or(0)
    }
}

/// Collects the referenced columns of one table, batch by batch.
///
/// Batches must be recorded in index order so that pool contents (and hence
/// child picks) are identical for a fixed seed.
#[derive(Debug)]
pub struct KeyPoolAccumulator {
    table: String,
    /// `(column position, column name, collected values)`.
    columns: Vec<(usize, String, Vec<Value>)>,
}

impl KeyPoolAccumulator {
    pub fn new(table: &str, referenced: Vec<(usize, String)>, expected_rows: u64) -> Self {
        Self {
            table: table.to_string(),
            columns: referenced
                .into_iter()
                .map(|(idx, name)| (idx, name, Vec::with_capacity(expected_rows as usize)))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn record_batch(&mut self, batch: &GeneratedBatch) {
        for (idx, _, values) in &mut self.columns {
            values.extend(
                batch.columns[*idx]
                    .iter()
                    .filter(|v| !v.is_null())
                    .cloned(),
            );
        }
    }

    /// Freeze the collected values into `pools`.
    pub fn finish(self, pools: &mut KeyPools) {
        for (_, name, values) in self.columns {
            pools.insert(&self.table, &name, values);
        }
    }
}

/// Columns of `table` that some foreign key in the schema references.
pub fn referenced_columns(schema: &ExperimentSchema, table: &str) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for t in &schema.tables {
        for (_, fk) in t.foreign_keys() {
            if fk.table == table && !columns.contains(&fk.column) {
                columns.push(fk.column.clone());
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::*;

    fn batch(index: u64, ids: &[i64]) -> GeneratedBatch {
        GeneratedBatch {
            table: "users".to_string(),
            index,
            start: 0,
            end: ids.len() as u64,
            columns: vec![ids.iter().map(|&i| Value::Int(i)).collect()],
        }
    }

    #[test]
    fn test_accumulate_in_batch_order() {
        let mut acc = KeyPoolAccumulator::new("users", vec![(0, "id".to_string())], 4);
        acc.record_batch(&batch(0, &[1, 2]));
        acc.record_batch(&batch(1, &[3, 4]));

        let mut pools = KeyPools::new();
        acc.finish(&mut pools);

        let pool = pools.get("users", "id").unwrap();
        assert_eq!(
            pool.as_slice(),
            &[Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
        );
        assert_eq!(pools.pool_size("users", "id"), 4);
    }

    #[test]
    fn test_empty_pool() {
        let pools = KeyPools::new();
        assert!(pools.get("users", "id").is_none());
        assert_eq!(pools.pool_size("users", "id"), 0);
    }

    #[test]
    fn test_referenced_columns() {
        let schema = ExperimentSchema::new("shop")
            .with_table(
                TableSchema::new("customers", 10)
                    .with_column(ColumnSchema::new("id", ColumnType::Integer).unique())
                    .with_column(ColumnSchema::new("email", ColumnType::VarChar).unique()),
            )
            .with_table(
                TableSchema::new("orders", 10)
                    .with_column(
                        ColumnSchema::new("customer_id", ColumnType::Integer)
                            .references("customers", "id", false),
                    )
                    .with_column(
                        ColumnSchema::new("gift_for", ColumnType::Integer)
                            .optional()
                            .references("customers", "id", true),
                    ),
            );

        assert_eq!(referenced_columns(&schema, "customers"), vec!["id"]);
        assert!(referenced_columns(&schema, "orders").is_empty());
    }
}
