//! # Schema Validation
//!
//! Fail-fast checks run when an experiment is registered, before any batch
//! work begins. Contradictory or malformed schemas are rejected with
//! `SynthKitError::SchemaValidation`; soft issues become table warnings.

use std::collections::HashSet;

use crate::artifact::parquet::arrow_type;
use crate::error::{Result, SynthKitError};
use crate::schema::types::{ColumnSchema, ColumnType, DistributionConfig, ExperimentSchema};
use crate::warehouse::WarehouseKind;

/// Validate an experiment schema, returning warnings per table as
/// `(table_name, warning)` pairs.
pub fn validate_schema(schema: &ExperimentSchema) -> Result<Vec<(String, String)>> {
    let fail = |message: String| SynthKitError::SchemaValidation {
        experiment: schema.name.clone(),
        message,
    };

    if !is_identifier(&schema.name) {
        return Err(fail(format!(
            "experiment name '{}' must be non-empty and contain only letters, digits and '_'",
            schema.name
        )));
    }

    if let Some(warehouse) = &schema.warehouse {
        warehouse.parse::<WarehouseKind>().map_err(|e| fail(e.to_string()))?;
    }

    let mut warnings = Vec::new();
    let mut table_names = HashSet::new();

    for table in &schema.tables {
        if !is_identifier(&table.name) {
            return Err(fail(format!(
                "table name '{}' must be non-empty and contain only letters, digits and '_'",
                table.name
            )));
        }
        if !table_names.insert(table.name.as_str()) {
            return Err(fail(format!("table '{}' is declared twice", table.name)));
        }
        if table.columns.is_empty() {
            return Err(fail(format!("table '{}' has no columns", table.name)));
        }

        let mut column_names = HashSet::new();
        for column in &table.columns {
            if !is_identifier(&column.name) {
                return Err(fail(format!(
                    "column name '{}.{}' must be non-empty and contain only letters, digits and '_'",
                    table.name, column.name
                )));
            }
            if !column_names.insert(column.name.as_str()) {
                return Err(fail(format!(
                    "column '{}.{}' is declared twice",
                    table.name, column.name
                )));
            }
            validate_column(&table.name, column).map_err(fail)?;

            if column.unique && column.distribution.is_some() {
                warnings.push((
                    table.name.clone(),
                    format!(
                        "{}: unique columns ignore the configured distribution and use sequential values",
                        column.name
                    ),
                ));
            }
        }

        for group in &table.composite_keys {
            for col in group {
                if table.column(col).is_none() {
                    return Err(fail(format!(
                        "composite key on '{}' references unknown column '{}'",
                        table.name, col
                    )));
                }
            }
        }
        if !table.composite_keys.is_empty() {
            warnings.push((
                table.name.clone(),
                "composite keys are recorded as metadata only; generation uses a single synthetic unique key"
                    .to_string(),
            ));
        }
    }

    // Foreign keys: referenced table must be in this schema, referenced column
    // must exist, act as a key and share the column's value type.
    for table in &schema.tables {
        for (column, fk) in table.foreign_keys() {
            let Some(target) = schema.table(&fk.table) else {
                return Err(fail(format!(
                    "{}.{} references table '{}' which is not part of the experiment",
                    table.name, column.name, fk.table
                )));
            };
            let Some(target_column) = target.column(&fk.column) else {
                return Err(fail(format!(
                    "{}.{} references unknown column {}.{}",
                    table.name, column.name, fk.table, fk.column
                )));
            };
            if !target_column.unique {
                return Err(fail(format!(
                    "{}.{} references {}.{}, which is not marked unique",
                    table.name, column.name, fk.table, fk.column
                )));
            }
            // Child rows carry the parent's values verbatim.
            if arrow_type(column.data_type) != arrow_type(target_column.data_type) {
                return Err(fail(format!(
                    "{}.{} has type {} but references {}.{} of type {}",
                    table.name,
                    column.name,
                    column.data_type,
                    fk.table,
                    fk.column,
                    target_column.data_type
                )));
            }
            if column.unique {
                return Err(fail(format!(
                    "{}.{} cannot be both unique and a foreign key",
                    table.name, column.name
                )));
            }
            if table.target_rows > 0 && target.target_rows == 0 && !fk.nullable {
                return Err(fail(format!(
                    "{}.{} is a required reference to {}, which generates no rows",
                    table.name, column.name, fk.table
                )));
            }
        }
    }

    Ok(warnings)
}

fn validate_column(table: &str, column: &ColumnSchema) -> std::result::Result<(), String> {
    let qualified = format!("{}.{}", table, column.name);

    if let (Some(min), Some(max)) = (column.min_value, column.max_value) {
        if min > max {
            return Err(format!(
                "{}: min_value {} is greater than max_value {}",
                qualified, min, max
            ));
        }
    }
    if let (Some(start), Some(end)) = (column.date_start, column.date_end) {
        if start > end {
            return Err(format!(
                "{}: date_start {} is after date_end {}",
                qualified, start, end
            ));
        }
    }
    if column.length == Some(0) {
        return Err(format!("{}: length must be greater than zero", qualified));
    }
    if let (Some(precision), Some(scale)) = (column.precision, column.scale) {
        if scale > precision {
            return Err(format!(
                "{}: scale {} exceeds precision {}",
                qualified, scale, precision
            ));
        }
    }

    if column.unique && !column.required {
        // Unique columns never receive NULLs; an optional flag is contradictory.
        return Err(format!(
            "{}: unique columns must be required (unique values are never NULL)",
            qualified
        ));
    }
    if column.unique && matches!(column.data_type, ColumnType::Boolean | ColumnType::Json) {
        return Err(format!(
            "{}: {} columns cannot be unique",
            qualified, column.data_type
        ));
    }

    if let Some(distribution) = &column.distribution {
        // Unique dates tolerate a distribution because the sequential strategy wins.
        let allowed = column.data_type.is_numeric()
            || (column.unique && column.data_type == ColumnType::Date);
        if !allowed {
            return Err(format!(
                "{}: distribution {} applies only to numeric columns, not {}",
                qualified, distribution, column.data_type
            ));
        }
        validate_distribution(distribution).map_err(|m| format!("{}: {}", qualified, m))?;
    }

    Ok(())
}

fn validate_distribution(distribution: &DistributionConfig) -> std::result::Result<(), String> {
    match *distribution {
        DistributionConfig::Normal { mean, stddev } => {
            if !mean.is_finite() || !stddev.is_finite() || stddev < 0.0 {
                return Err(format!(
                    "normal distribution needs a finite mean and stddev >= 0 (got mean={}, stddev={})",
                    mean, stddev
                ));
            }
        }
        DistributionConfig::Exponential { rate } => {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(format!(
                    "exponential distribution needs rate > 0 (got {})",
                    rate
                ));
            }
        }
        DistributionConfig::Beta { alpha, beta } => {
            if !(alpha.is_finite() && beta.is_finite() && alpha > 0.0 && beta > 0.0) {
                return Err(format!(
                    "beta distribution needs alpha > 0 and beta > 0 (got alpha={}, beta={})",
                    alpha, beta
                ));
            }
        }
    }
    Ok(())
}

/// Identifiers end up in physical table names, so they are kept to a safe subset.
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::*;

    fn customers() -> TableSchema {
        TableSchema::new("customers", 10)
            .with_column(ColumnSchema::new("id", ColumnType::Integer).unique())
    }

    fn expect_validation_error(schema: &ExperimentSchema, needle: &str) {
        match validate_schema(schema) {
            Err(SynthKitError::SchemaValidation { message, .. }) => {
                assert!(message.contains(needle), "unexpected message: {}", message)
            }
            other => panic!("expected SchemaValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_schema_passes() {
        let schema = ExperimentSchema::new("shop").with_table(customers()).with_table(
            TableSchema::new("orders", 50).with_column(
                ColumnSchema::new("customer_id", ColumnType::Integer)
                    .references("customers", "id", false),
            ),
        );
        let warnings = validate_schema(&schema).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_fk_to_missing_table_rejected() {
        let schema = ExperimentSchema::new("shop").with_table(
            TableSchema::new("orders", 50).with_column(
                ColumnSchema::new("customer_id", ColumnType::Integer)
                    .references("customers", "id", false),
            ),
        );
        expect_validation_error(&schema, "not part of the experiment");
    }

    #[test]
    fn test_fk_to_non_unique_column_rejected() {
        let schema = ExperimentSchema::new("shop")
            .with_table(
                TableSchema::new("customers", 10)
                    .with_column(ColumnSchema::new("id", ColumnType::Integer)),
            )
            .with_table(
                TableSchema::new("orders", 50).with_column(
                    ColumnSchema::new("customer_id", ColumnType::Integer)
                        .references("customers", "id", false),
                ),
            );
        expect_validation_error(&schema, "not marked unique");
    }

    #[test]
    fn test_fk_type_must_match_referenced_column() {
        let schema = ExperimentSchema::new("shop").with_table(customers()).with_table(
            TableSchema::new("orders", 50).with_column(
                ColumnSchema::new("customer_id", ColumnType::VarChar)
                    .length(20)
                    .references("customers", "id", false),
            ),
        );
        expect_validation_error(&schema, "references customers.id of type");

        // Integer widths share one value type.
        let schema = ExperimentSchema::new("shop").with_table(customers()).with_table(
            TableSchema::new("orders", 50).with_column(
                ColumnSchema::new("customer_id", ColumnType::BigInt)
                    .references("customers", "id", false),
            ),
        );
        assert!(validate_schema(&schema).is_ok());
    }

    #[test]
    fn test_distribution_on_string_rejected() {
        let schema = ExperimentSchema::new("shop").with_table(
            TableSchema::new("t", 10).with_column(
                ColumnSchema::new("name", ColumnType::Text)
                    .distributed(DistributionConfig::Exponential { rate: 1.0 }),
            ),
        );
        expect_validation_error(&schema, "only to numeric columns");
    }

    #[test]
    fn test_unique_with_distribution_warns() {
        let schema = ExperimentSchema::new("shop").with_table(
            TableSchema::new("t", 10).with_column(
                ColumnSchema::new("score", ColumnType::Integer)
                    .unique()
                    .distributed(DistributionConfig::Normal {
                        mean: 10.0,
                        stddev: 2.0,
                    }),
            ),
        );
        let warnings = validate_schema(&schema).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].1.contains("sequential"));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let schema = ExperimentSchema::new("shop").with_table(
            TableSchema::new("t", 10)
                .with_column(ColumnSchema::new("qty", ColumnType::Integer).range(10.0, 1.0)),
        );
        expect_validation_error(&schema, "greater than max_value");
    }

    #[test]
    fn test_bad_beta_parameters_rejected() {
        let schema = ExperimentSchema::new("shop").with_table(
            TableSchema::new("t", 10).with_column(
                ColumnSchema::new("ratio", ColumnType::Double)
                    .range(0.0, 1.0)
                    .distributed(DistributionConfig::Beta {
                        alpha: 0.0,
                        beta: 1.0,
                    }),
            ),
        );
        expect_validation_error(&schema, "alpha > 0");
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let schema = ExperimentSchema::new("shop")
            .with_table(customers())
            .with_table(customers());
        expect_validation_error(&schema, "declared twice");
    }

    #[test]
    fn test_unknown_warehouse_rejected() {
        let mut schema = ExperimentSchema::new("shop").with_table(customers());
        schema.warehouse = Some("snowflake".to_string());
        expect_validation_error(&schema, "unknown warehouse");
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("orders_2024"));
        assert!(!is_identifier("2024_orders"));
        assert!(!is_identifier("drop table"));
        assert!(!is_identifier(""));
    }
}
