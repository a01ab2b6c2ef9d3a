use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named experiment: the schema whose data is generated and loaded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tables: Vec<TableSchema>,
    /// Preferred warehouse backend ("analytics", "cloud_emulator", "embedded").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
}

impl ExperimentSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tables: Vec::new(),
            warehouse: None,
        }
    }

    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Position of a table in declaration order.
    pub fn table_position(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.name == name)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn foreign_key_count(&self) -> usize {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter())
            .filter(|c| c.foreign_key.is_some())
            .count()
    }

    /// Parse a schema document from JSON.
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Parse a schema document from TOML.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// A table and the number of rows to generate for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    /// Rows to generate. Zero means the table is created but never populated.
    #[serde(default)]
    pub target_rows: u64,
    pub columns: Vec<ColumnSchema>,
    /// Composite key column groups. Kept as metadata only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composite_keys: Vec<Vec<String>>,
    /// User-facing warnings. Append-only after registration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, target_rows: u64) -> Self {
        Self {
            name: name.into(),
            target_rows,
            columns: Vec::new(),
            composite_keys: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnSchema) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Foreign keys declared on this table's columns, as (column, config) pairs.
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&ColumnSchema, &ForeignKeyConfig)> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref().map(|fk| (c, fk)))
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

/// A single column with its type, constraints and generation hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: ColumnType,
    /// Required columns never receive injected NULLs.
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Maximum character length for string types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_end: Option<NaiveDate>,
    /// Name of a realistic-value rule (e.g. "email", "first_name").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realistic_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionConfig>,
}

fn default_required() -> bool {
    true
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: true,
            unique: false,
            min_value: None,
            max_value: None,
            length: None,
            precision: None,
            scale: None,
            date_start: None,
            date_end: None,
            realistic_rule: None,
            foreign_key: None,
            distribution: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_start = Some(start);
        self.date_end = Some(end);
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn realistic(mut self, rule: impl Into<String>) -> Self {
        self.realistic_rule = Some(rule.into());
        self
    }

    pub fn references(mut self, table: &str, column: &str, nullable: bool) -> Self {
        self.foreign_key = Some(ForeignKeyConfig {
            table: table.to_string(),
            column: column.to_string(),
            nullable,
        });
        self
    }

    pub fn distributed(mut self, distribution: DistributionConfig) -> Self {
        self.distribution = Some(distribution);
        self
    }
}

/// Closed enumeration of supported column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    /// Fixed-point decimal; precision/scale come from the column.
    Decimal,
    Char,
    VarChar,
    Text,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Boolean,
    /// Semi-structured document.
    Json,
    /// 128-bit identifier.
    Uuid,
}

impl ColumnType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer()
            || matches!(
                self,
                ColumnType::Float | ColumnType::Double | ColumnType::Decimal
            )
    }

    pub fn is_string(&self) -> bool {
        matches!(self, ColumnType::Char | ColumnType::VarChar | ColumnType::Text)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnType::Date | ColumnType::Time | ColumnType::Timestamp | ColumnType::TimestampTz
        )
    }

    /// Largest value representable by an integer type.
    pub fn integer_max(&self) -> Option<i64> {
        match self {
            ColumnType::SmallInt => Some(i16::MAX as i64),
            ColumnType::Integer => Some(i32::MAX as i64),
            ColumnType::BigInt => Some(i64::MAX),
            _ => None,
        }
    }

    /// Smallest value representable by an integer type.
    pub fn integer_min(&self) -> Option<i64> {
        match self {
            ColumnType::SmallInt => Some(i16::MIN as i64),
            ColumnType::Integer => Some(i32::MIN as i64),
            ColumnType::BigInt => Some(i64::MIN),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::SmallInt => write!(f, "smallint"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::BigInt => write!(f, "bigint"),
            ColumnType::Float => write!(f, "real"),
            ColumnType::Double => write!(f, "double precision"),
            ColumnType::Decimal => write!(f, "decimal"),
            ColumnType::Char => write!(f, "char"),
            ColumnType::VarChar => write!(f, "varchar"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Time => write!(f, "time"),
            ColumnType::Timestamp => write!(f, "timestamp"),
            ColumnType::TimestampTz => write!(f, "timestamptz"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Json => write!(f, "json"),
            ColumnType::Uuid => write!(f, "uuid"),
        }
    }
}

/// Reference from a column to a unique column of another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConfig {
    pub table: String,
    pub column: String,
    /// Nullable references do not constrain generation order.
    #[serde(default)]
    pub nullable: bool,
}

/// Statistical distribution for numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionConfig {
    Normal { mean: f64, stddev: f64 },
    Exponential { rate: f64 },
    Beta { alpha: f64, beta: f64 },
}

impl fmt::Display for DistributionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionConfig::Normal { mean, stddev } => {
                write!(f, "normal(mean={}, stddev={})", mean, stddev)
            }
            DistributionConfig::Exponential { rate } => write!(f, "exponential(rate={})", rate),
            DistributionConfig::Beta { alpha, beta } => {
                write!(f, "beta(alpha={}, beta={})", alpha, beta)
            }
        }
    }
}
