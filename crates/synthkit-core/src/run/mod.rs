//! # Generation Runs
//!
//! Run records, their on-disk store and the orchestrator that drives a run
//! from schema to loaded warehouse tables.

pub mod orchestrator;
pub mod store;
pub mod types;

pub use orchestrator::RunOrchestrator;
pub use store::RunStore;
pub use types::{ErrorDetail, GenerationRun, RunOutcome, RunStatus};
