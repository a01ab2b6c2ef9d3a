pub mod catalog;
pub mod types;
pub mod validate;

use std::path::Path;

use crate::error::{Result, SynthKitError};
use crate::schema::types::ExperimentSchema;

/// Read an experiment schema document. `.toml` files are parsed as TOML,
/// everything else as JSON.
pub fn read_schema_file(path: &Path) -> Result<ExperimentSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| SynthKitError::Output {
        message: format!("Failed to read schema from {}", path.display()),
        source: e,
    })?;

    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    if is_toml {
        ExperimentSchema::from_toml(&content).map_err(|e| SynthKitError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })
    } else {
        ExperimentSchema::from_json(&content).map_err(|e| SynthKitError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })
    }
}
