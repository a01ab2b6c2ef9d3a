//! # Warehouse Backends
//!
//! A warehouse backend is a SQL database reachable through a URL. Three
//! logical backends are recognised (analytics, cloud emulator and embedded),
//! and each may point at any supported engine; the SQL dialect comes from the
//! URL scheme:
//!
//! - `postgres://` / `postgresql://`: PostgreSQL, with a `COPY` bulk path
//! - `mysql://` / `mariadb://`: MySQL
//! - `sqlite://`: SQLite
//!
//! Every experiment's tables live side by side in the backend under
//! physical names of the form `<experiment>__<table>`.

pub mod connection;
pub mod loader;
pub mod router;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthKitError};
use crate::schema::types::{ColumnSchema, ColumnType, TableSchema};

pub use connection::WarehouseConnection;
pub use router::WarehouseRouter;

/// SQL dialect spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Whether the dialect has a bulk-load path.
    pub fn supports_bulk_load(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "PostgreSQL"),
            Dialect::MySql => write!(f, "MySQL"),
            Dialect::Sqlite => write!(f, "SQLite"),
        }
    }
}

/// Detect the dialect from a backend URL's scheme.
pub fn dialect_from_url(url: &str) -> Result<Dialect> {
    let scheme = url.split("://").next().unwrap_or("").to_ascii_lowercase();
    match scheme.as_str() {
        "postgres" | "postgresql" => Ok(Dialect::Postgres),
        "mysql" | "mariadb" => Ok(Dialect::MySql),
        "sqlite" => Ok(Dialect::Sqlite),
        _ => Err(SynthKitError::UnsupportedWarehouse { scheme }),
    }
}

/// The logical warehouse backends, in fallback order after an explicit choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseKind {
    Analytics,
    CloudEmulator,
    Embedded,
}

impl WarehouseKind {
    pub const FALLBACK_ORDER: [WarehouseKind; 3] = [
        WarehouseKind::Analytics,
        WarehouseKind::CloudEmulator,
        WarehouseKind::Embedded,
    ];
}

impl fmt::Display for WarehouseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseKind::Analytics => write!(f, "analytics"),
            WarehouseKind::CloudEmulator => write!(f, "cloud_emulator"),
            WarehouseKind::Embedded => write!(f, "embedded"),
        }
    }
}

impl FromStr for WarehouseKind {
    type Err = SynthKitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "analytics" => Ok(WarehouseKind::Analytics),
            "cloud_emulator" | "emulator" => Ok(WarehouseKind::CloudEmulator),
            "embedded" => Ok(WarehouseKind::Embedded),
            other => Err(SynthKitError::Config {
                message: format!(
                    "unknown warehouse '{}' (expected analytics, cloud_emulator or embedded)",
                    other
                ),
            }),
        }
    }
}

/// Separator between experiment and table in physical table names.
pub const TABLE_SEPARATOR: &str = "__";

/// Physical name of an experiment's table in the warehouse.
pub fn physical_table_name(experiment: &str, table: &str) -> String {
    format!("{}{}{}", experiment, TABLE_SEPARATOR, table)
}

static TABLE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(from|join|into|update|table)(\s+)(?:"([A-Za-z_][A-Za-z0-9_]*)"|`([A-Za-z_][A-Za-z0-9_]*)`|([A-Za-z_][A-Za-z0-9_]*))"#,
    )
    .unwrap()
});

/// Rewrite references to an experiment's logical table names into physical
/// names. Only identifiers following `FROM`, `JOIN`, `INTO`, `UPDATE` or
/// `TABLE` that name one of `tables` are touched; everything else, including
/// names that are already physical, is left as written.
pub fn scope_query(sql: &str, experiment: &str, tables: &[String], dialect: Dialect) -> String {
    let known: HashSet<&str> = tables.iter().map(String::as_str).collect();
    TABLE_REFERENCE
        .replace_all(sql, |caps: &Captures| {
            let name = caps
                .get(3)
                .or_else(|| caps.get(4))
                .or_else(|| caps.get(5))
                .map_or("", |m| m.as_str());
            if known.contains(name) {
                format!(
                    "{}{}{}",
                    &caps[1],
                    &caps[2],
                    quote_identifier(&physical_table_name(experiment, name), dialect)
                )
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Quote a SQL identifier for the dialect.
pub fn quote_identifier(name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        _ => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

/// Column type in the dialect's DDL.
pub fn sql_type(column: &ColumnSchema, dialect: Dialect) -> String {
    let length = column.length.unwrap_or(255);
    let precision = column.precision.unwrap_or(18);
    let scale = column.scale.unwrap_or(2);

    match dialect {
        Dialect::Sqlite => match column.data_type {
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt => "INTEGER",
            ColumnType::Boolean => "INTEGER",
            ColumnType::Float | ColumnType::Double => "REAL",
            ColumnType::Decimal => "NUMERIC",
            _ => "TEXT",
        }
        .to_string(),
        Dialect::Postgres => match column.data_type {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal => format!("NUMERIC({}, {})", precision, scale),
            ColumnType::Char => format!("CHAR({})", length),
            ColumnType::VarChar => format!("VARCHAR({})", length),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::TimestampTz => "TIMESTAMPTZ".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
        },
        Dialect::MySql => match column.data_type {
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INT".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Decimal => format!("DECIMAL({}, {})", precision, scale),
            ColumnType::Char => format!("CHAR({})", length),
            ColumnType::VarChar => format!("VARCHAR({})", length),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            // TIMESTAMP stops at 2038 in MySQL.
            ColumnType::Timestamp | ColumnType::TimestampTz => "DATETIME".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
        },
    }
}

/// `CREATE TABLE IF NOT EXISTS` for a table's physical name.
pub fn create_table_sql(experiment: &str, table: &TableSchema, dialect: Dialect) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let nullable_fk = c.foreign_key.as_ref().is_some_and(|fk| fk.nullable);
            let null = if c.required && !nullable_fk {
                " NOT NULL"
            } else {
                ""
            };
            format!("{} {}{}", quote_identifier(&c.name, dialect), sql_type(c, dialect), null)
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(&physical_table_name(experiment, &table.name), dialect),
        columns.join(", ")
    )
}

/// Truncate a SQL string for error messages.
pub fn truncate_sql(sql: &str, max_len: usize) -> String {
    if sql.len() <= max_len {
        return sql.to_string();
    }
    let mut end = max_len;
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &sql[..end])
}

/// Sanitize a database URL for error messages (hide password).
pub fn sanitize_url(db_url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(db_url) {
        if parsed.password().is_some() && parsed.set_password(Some("****")).is_ok() {
            return parsed.to_string();
        }
    }
    db_url.to_string()
}
