pub mod artifact;
pub mod config;
pub mod error;
pub mod generate;
pub mod graph;
pub mod run;
pub mod schema;
pub mod warehouse;

// Re-export key types for convenience
pub use error::{Result, SynthKitError};
pub use run::{GenerationRun, RunOrchestrator, RunStatus};
pub use schema::catalog::ExperimentCatalog;
pub use schema::types::{ColumnSchema, ColumnType, ExperimentSchema, TableSchema};
