//! # Error Types
//!
//! Defines `SynthKitError`, the unified error enum for every failure mode in
//! the generation and loading pipeline. Every variant carries enough context
//! (experiment, table, column, SQL snippet) to debug a failed run from its
//! recorded error detail alone.

use thiserror::Error;

/// All errors that can occur in SynthKit operations.
#[derive(Error, Debug)]
pub enum SynthKitError {
    #[error("Schema validation failed for experiment '{experiment}': {message}")]
    SchemaValidation { experiment: String, message: String },

    #[error("Circular dependency detected among required foreign keys: {tables}\n  No generation order can satisfy these tables. Mark one of the foreign keys in the cycle as nullable to break it.")]
    CircularDependency { tables: String },

    #[error("Range exhausted for unique column {table}.{column}: {available} distinct values available but {required} rows requested")]
    RangeExhaustion {
        table: String,
        column: String,
        available: u64,
        required: u64,
    },

    #[error("Failed to generate unique value for {table}.{column} at row {row_index}: {max_retries} retries exhausted\n  Consider widening the column's length or lowering the table's target rows")]
    UniqueValueExhaustion {
        table: String,
        column: String,
        row_index: u64,
        max_retries: usize,
    },

    #[error("Foreign key resolution failed: {source_table}.{source_column} references {target_table}.{target_column}, but the target table has not produced a value pool")]
    ForeignKeyResolution {
        source_table: String,
        source_column: String,
        target_table: String,
        target_column: String,
    },

    #[error("Experiment '{experiment}' already has an active {activity}; wait for it to finish before starting another operation")]
    ConcurrentRun { experiment: String, activity: String },

    #[error("Loading {table} into the {backend} warehouse failed: bulk path: {bulk_error}; insert fallback: {source}")]
    WarehouseLoad {
        table: String,
        backend: String,
        bulk_error: String,
        #[source]
        source: Box<SynthKitError>,
    },

    #[error("Warehouse connection failed: {message}\n  Connection string: {connection_hint}\n  Cause: {source}")]
    Connection {
        message: String,
        connection_hint: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed on {table}: {message}\n  SQL: {sql_preview}\n  DB error: {source}")]
    Query {
        table: String,
        message: String,
        sql_preview: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Unsupported warehouse scheme '{scheme}'. Supported: postgres://, mysql://, sqlite://")]
    UnsupportedWarehouse { scheme: String },

    #[error("Artifact error for {path}: {message}")]
    Artifact { path: String, message: String },

    #[error("Output error: {message}: {source}")]
    Output {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unknown experiment '{0}'")]
    UnknownExperiment(String),

    #[error("Generation run {0} not found")]
    RunNotFound(String),

    #[error("Run for experiment '{experiment}' was aborted before {stage}")]
    Aborted { experiment: String, stage: String },

    #[error("{0}")]
    Other(String),
}

impl SynthKitError {
    /// Whether this error represents a cooperative abort rather than a failure.
    pub fn is_abort(&self) -> bool {
        matches!(self, SynthKitError::Aborted { .. })
    }

    /// Render the error's source chain, outermost first.
    pub fn source_chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

pub type Result<T> = std::result::Result<T, SynthKitError>;
