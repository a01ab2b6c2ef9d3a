use std::path::Path;

use chrono::NaiveDate;

use synthkit_core::config::{GenerationConfig, RunsConfig, SynthKitConfig, WarehouseConfig};
use synthkit_core::schema::types::*;

/// The customers/orders experiment: 100 customers, 1000 orders, every order
/// pointing at an existing customer.
pub fn shop_schema() -> ExperimentSchema {
    ExperimentSchema::new("shop")
        .with_table(
            TableSchema::new("customers", 100)
                .with_column(ColumnSchema::new("id", ColumnType::Integer).unique())
                .with_column(
                    ColumnSchema::new("email", ColumnType::VarChar)
                        .unique()
                        .length(120)
                        .realistic("email"),
                )
                .with_column(
                    ColumnSchema::new("first_name", ColumnType::VarChar)
                        .length(60)
                        .realistic("first_name"),
                )
                .with_column(
                    ColumnSchema::new("signup_date", ColumnType::Date)
                        .optional()
                        .dates(date(2022, 1, 1), date(2024, 12, 31)),
                ),
        )
        .with_table(
            TableSchema::new("orders", 1000)
                .with_column(ColumnSchema::new("id", ColumnType::BigInt).unique())
                .with_column(
                    ColumnSchema::new("customer_id", ColumnType::Integer)
                        .references("customers", "id", false),
                )
                .with_column(
                    ColumnSchema::new("amount", ColumnType::Decimal)
                        .range(1.0, 500.0)
                        .distributed(DistributionConfig::Exponential { rate: 2.0 }),
                )
                .with_column(ColumnSchema::new("status", ColumnType::Text).optional()),
        )
}

/// One table with a single unique integer column.
pub fn unique_ints_schema(name: &str, rows: u64) -> ExperimentSchema {
    ExperimentSchema::new(name).with_table(
        TableSchema::new("items", rows)
            .with_column(ColumnSchema::new("id", ColumnType::Integer).unique())
            .with_column(ColumnSchema::new("score", ColumnType::Double).range(0.0, 1.0)),
    )
}

/// Two tables with required references to each other.
pub fn cyclic_schema() -> ExperimentSchema {
    ExperimentSchema::new("cyclic")
        .with_table(
            TableSchema::new("a", 10)
                .with_column(ColumnSchema::new("id", ColumnType::Integer).unique())
                .with_column(ColumnSchema::new("b_id", ColumnType::Integer).references("b", "id", false)),
        )
        .with_table(
            TableSchema::new("b", 10)
                .with_column(ColumnSchema::new("id", ColumnType::Integer).unique())
                .with_column(ColumnSchema::new("a_id", ColumnType::Integer).references("a", "id", false)),
        )
}

/// A unique date column over a 10-day range asked for `rows` rows.
pub fn short_date_range_schema(rows: u64) -> ExperimentSchema {
    ExperimentSchema::new("calendar").with_table(
        TableSchema::new("days", rows).with_column(
            ColumnSchema::new("day", ColumnType::Date)
                .unique()
                .dates(date(2024, 1, 1), date(2024, 1, 10)),
        ),
    )
}

/// One optional text column and one required id, for NULL-rate checks.
pub fn optional_column_schema(rows: u64) -> ExperimentSchema {
    ExperimentSchema::new("sparse").with_table(
        TableSchema::new("events", rows)
            .with_column(ColumnSchema::new("id", ColumnType::BigInt).unique())
            .with_column(ColumnSchema::new("note", ColumnType::Integer).optional().range(0.0, 9.0)),
    )
}

/// 40 accounts and `rows` transfers with an optional reference to an account.
pub fn optional_reference_schema(rows: u64) -> ExperimentSchema {
    ExperimentSchema::new("ledger")
        .with_table(
            TableSchema::new("accounts", 40)
                .with_column(ColumnSchema::new("id", ColumnType::Integer).unique()),
        )
        .with_table(
            TableSchema::new("transfers", rows)
                .with_column(ColumnSchema::new("id", ColumnType::BigInt).unique())
                .with_column(
                    ColumnSchema::new("account_id", ColumnType::Integer)
                        .optional()
                        .references("accounts", "id", true),
                ),
        )
}

/// A unique first-name column, asked for far more rows than the name list
/// holds, so later batches repeat values from earlier ones.
pub fn unique_names_schema(rows: u64) -> ExperimentSchema {
    ExperimentSchema::new("people").with_table(
        TableSchema::new("people", rows).with_column(
            ColumnSchema::new("name", ColumnType::VarChar)
                .unique()
                .length(60)
                .realistic("first_name"),
        ),
    )
}

/// Configuration rooted in a scratch directory, using the default embedded
/// SQLite warehouse inside it.
pub fn test_config(root: &Path, workers: usize, batch_size: u64) -> SynthKitConfig {
    SynthKitConfig {
        generation: GenerationConfig {
            batch_size,
            workers: Some(workers),
            artifact_root: root.join("artifacts"),
            ..Default::default()
        },
        warehouse: WarehouseConfig::default(),
        runs: RunsConfig {
            state_dir: root.join("runs"),
            stale_after_secs: None,
        },
        config_dir: Some(root.to_path_buf()),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
}
