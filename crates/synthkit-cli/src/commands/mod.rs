pub mod generate;
pub mod order;
pub mod query;
pub mod reset;
pub mod runs;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use synthkit_core::config::{load_config, SynthKitConfig};
use synthkit_core::schema::read_schema_file;
use synthkit_core::{ExperimentCatalog, ExperimentSchema, RunOrchestrator};

/// A registered experiment and the orchestrator that serves it.
pub struct Session {
    pub orchestrator: RunOrchestrator,
    pub schema: Arc<ExperimentSchema>,
}

impl Session {
    pub fn open(config: &SynthKitConfig, schema_path: &Path) -> Result<Self> {
        let schema = read_schema_file(schema_path)?;
        let catalog = Arc::new(ExperimentCatalog::new());
        let schema = catalog
            .register(schema)
            .with_context(|| format!("Invalid experiment in {}", schema_path.display()))?;
        let orchestrator = RunOrchestrator::new(config, catalog)?;
        Ok(Self {
            orchestrator,
            schema,
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }
}

pub fn config(dir: &Path) -> Result<SynthKitConfig> {
    load_config(dir).with_context(|| format!("Failed to load configuration from {}", dir.display()))
}

pub fn spinner(prefix: &str, message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} [{prefix}] {msg}")?);
    pb.set_prefix(prefix.to_string());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}
