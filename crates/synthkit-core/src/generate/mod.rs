pub mod batch;
pub mod distribution;
pub mod driver;
pub mod engine;
pub mod foreign_key;
pub mod plan;
pub mod providers;
pub mod strategy;
pub mod unique;
pub mod value;

pub use driver::{AbortToken, TableOutput};
pub use engine::{ExperimentArtifacts, GenerationEngine};
pub use plan::GenerationSettings;
pub use value::Value;
