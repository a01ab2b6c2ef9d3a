pub mod csv;
pub mod parquet;

pub use self::parquet::{read_batch, ArtifactColumn, ArtifactStore};
