//! # Experiment Catalog
//!
//! Holds registered experiment schemas. Names are unique and schemas are
//! immutable once registered; the only permitted mutation is appending
//! warnings to a table, which swaps in a new `Arc` (readers holding the old
//! snapshot are unaffected).

use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::{Result, SynthKitError};
use crate::schema::types::ExperimentSchema;
use crate::schema::validate::validate_schema;

#[derive(Default)]
pub struct ExperimentCatalog {
    experiments: Mutex<IndexMap<String, Arc<ExperimentSchema>>>,
}

impl ExperimentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a new experiment. Fails if the name is taken.
    pub fn register(&self, mut schema: ExperimentSchema) -> Result<Arc<ExperimentSchema>> {
        let warnings = validate_schema(&schema)?;
        for (table_name, warning) in warnings {
            warn!("{}.{}: {}", schema.name, table_name, warning);
            if let Some(table) = schema.tables.iter_mut().find(|t| t.name == table_name) {
                table.push_warning(warning);
            }
        }

        let mut experiments = self.experiments.lock().unwrap_or_else(PoisonError::into_inner);
        if experiments.contains_key(&schema.name) {
            return Err(SynthKitError::SchemaValidation {
                experiment: schema.name.clone(),
                message: "an experiment with this name already exists".to_string(),
            });
        }

        info!(
            "Registered experiment '{}' ({} tables, {} foreign keys)",
            schema.name,
            schema.table_count(),
            schema.foreign_key_count()
        );
        let schema = Arc::new(schema);
        experiments.insert(schema.name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Result<Arc<ExperimentSchema>> {
        self.experiments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| SynthKitError::UnknownExperiment(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.experiments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Append a warning to one table of an experiment.
    pub fn append_warning(&self, experiment: &str, table: &str, warning: &str) -> Result<()> {
        let mut experiments = self.experiments.lock().unwrap_or_else(PoisonError::into_inner);
        let current = experiments
            .get(experiment)
            .ok_or_else(|| SynthKitError::UnknownExperiment(experiment.to_string()))?;

        let mut updated = ExperimentSchema::clone(current);
        match updated.tables.iter_mut().find(|t| t.name == table) {
            Some(t) => t.push_warning(warning),
            None => {
                return Err(SynthKitError::Other(format!(
                    "experiment '{}' has no table '{}'",
                    experiment, table
                )))
            }
        }
        experiments.insert(experiment.to_string(), Arc::new(updated));
        Ok(())
    }
}
