//! # Run Orchestrator
//!
//! The public surface for generation runs. `start_generation` validates and
//! orders the experiment up front (no run is created for an invalid schema),
//! claims the experiment's lease, then returns while a background task
//! generates every table on a blocking worker and loads the artifacts into
//! the warehouse one table at a time.
//!
//! A run ends COMPLETED, FAILED or ABORTED. Tables loaded before a failure
//! stay loaded.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact::ArtifactStore;
use crate::config::SynthKitConfig;
use crate::error::{Result, SynthKitError};
use crate::generate::driver::AbortToken;
use crate::generate::engine::GenerationEngine;
use crate::generate::plan::GenerationSettings;
use crate::generate::providers::FakerProvider;
use crate::graph::resolve_order;
use crate::run::store::RunStore;
use crate::run::types::{ErrorDetail, GenerationRun, RunOutcome};
use crate::schema::catalog::ExperimentCatalog;
use crate::schema::types::ExperimentSchema;
use crate::warehouse::WarehouseRouter;

/// A run executing in this process.
struct LiveRun {
    abort: AbortToken,
    done: watch::Receiver<bool>,
}

struct Inner {
    catalog: Arc<ExperimentCatalog>,
    store: RunStore,
    engine: Arc<GenerationEngine>,
    router: WarehouseRouter,
    live: Mutex<HashMap<Uuid, LiveRun>>,
}

/// Error paired with the stage it happened in.
type StageError = (String, SynthKitError);

#[derive(Clone)]
pub struct RunOrchestrator {
    inner: Arc<Inner>,
}

impl RunOrchestrator {
    /// Build an orchestrator from configuration. When `runs.stale_after_secs`
    /// is set, stale RUNNING runs left by earlier processes are recovered
    /// immediately.
    pub fn new(config: &SynthKitConfig, catalog: Arc<ExperimentCatalog>) -> Result<Self> {
        let store = RunStore::open(config.state_dir())?;
        let engine = GenerationEngine::new(
            GenerationSettings::from(&config.generation),
            ArtifactStore::new(config.artifact_root()),
            Arc::new(FakerProvider),
        );
        let router = WarehouseRouter::from_config(config);
        let orchestrator = Self::from_parts(catalog, store, engine, router);

        if let Some(max_age) = config.runs.stale_after() {
            orchestrator.recover_stale_runs(max_age)?;
        }
        Ok(orchestrator)
    }

    pub fn from_parts(
        catalog: Arc<ExperimentCatalog>,
        store: RunStore,
        engine: GenerationEngine,
        router: WarehouseRouter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                store,
                engine: Arc::new(engine),
                router,
                live: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn catalog(&self) -> &ExperimentCatalog {
        &self.inner.catalog
    }

    pub fn router(&self) -> &WarehouseRouter {
        &self.inner.router
    }

    /// Start generating an experiment. Returns the new run's id as soon as
    /// the run is recorded; use `wait_for_run` or `get_run` to follow it.
    pub async fn start_generation(
        &self,
        experiment: &str,
        row_overrides: BTreeMap<String, u64>,
        seed: Option<u64>,
    ) -> Result<Uuid> {
        let schema = self.inner.catalog.get(experiment)?;
        if let Some(unknown) = row_overrides.keys().find(|t| schema.table(t).is_none()) {
            return Err(SynthKitError::SchemaValidation {
                experiment: schema.name.clone(),
                message: format!("row override names unknown table '{}'", unknown),
            });
        }
        let order = resolve_order(&schema)?;

        let seed = seed.unwrap_or_else(rand::random::<u64>);
        let run = GenerationRun::new(&schema.name, seed, order.tables, row_overrides);

        // The run is live before its lease is visible, so stale recovery in
        // this process never mistakes it for an orphan.
        let abort = AbortToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.inner.live_runs().insert(
            run.id,
            LiveRun {
                abort: abort.clone(),
                done: done_rx,
            },
        );
        let run = match self.inner.store.begin_run(run.clone()) {
            Ok(run) => run,
            Err(e) => {
                self.inner.live_runs().remove(&run.id);
                return Err(e);
            }
        };

        info!(
            "Generating '{}' (run {}, seed {}, order: {})",
            schema.name,
            run.id,
            seed,
            run.table_order.join(" -> ")
        );
        let id = run.id;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.drive(run, schema, abort, done_tx));
        Ok(id)
    }

    pub fn get_run(&self, run_id: Uuid) -> Result<GenerationRun> {
        self.inner.store.get(run_id)
    }

    /// Wait until a run owned by this process reaches a terminal state.
    /// Runs owned by another process are returned as they currently are.
    pub async fn wait_for_run(&self, run_id: Uuid) -> Result<GenerationRun> {
        let done = self
            .inner
            .live_runs()
            .get(&run_id)
            .map(|live| live.done.clone());
        if let Some(mut done) = done {
            // A dropped sender means the task is gone; the store has the last word.
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.inner.store.get(run_id)
    }

    /// Ask a run to stop at its next batch or table boundary.
    pub fn abort_run(&self, run_id: Uuid) -> Result<()> {
        if let Some(live) = self.inner.live_runs().get(&run_id) {
            info!("Abort requested for run {}", run_id);
            live.abort.abort();
            return Ok(());
        }
        let run = self.inner.store.get(run_id)?;
        if run.is_running() {
            return Err(SynthKitError::Other(format!(
                "run {} is not executing in this process; use stale run recovery to release it",
                run_id
            )));
        }
        Ok(())
    }

    pub fn list_runs(&self, experiment: Option<&str>) -> Vec<GenerationRun> {
        self.inner.store.list(experiment)
    }

    /// Mark RUNNING runs older than `max_age` that this process does not own
    /// as ABORTED, releasing their experiments.
    pub fn recover_stale_runs(&self, max_age: Duration) -> Result<Vec<GenerationRun>> {
        // Held throughout, so a run starting meanwhile waits to register.
        let live = self.inner.live_runs();
        self.inner
            .store
            .recover_stale(max_age, |id| live.contains_key(&id))
    }

    /// Truncate every physical table of an experiment. Rejected while a run
    /// holds the experiment.
    pub async fn reset_experiment(&self, experiment: &str) -> Result<Vec<String>> {
        let schema = self.inner.catalog.get(experiment)?;
        let _lease = self.inner.store.acquire_reset(&schema.name)?;
        self.inner.router.reset(&schema).await
    }
}

impl Inner {
    fn live_runs(&self) -> MutexGuard<'_, HashMap<Uuid, LiveRun>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drive(
        self: Arc<Self>,
        run: GenerationRun,
        schema: Arc<ExperimentSchema>,
        abort: AbortToken,
        done: watch::Sender<bool>,
    ) {
        let mut row_counts = BTreeMap::new();
        let outcome = match self
            .generate_and_load(&run, &schema, &abort, &mut row_counts)
            .await
        {
            Ok(()) => RunOutcome::Completed,
            Err((stage, e)) if e.is_abort() => {
                info!("Run {} for '{}' aborted during {}", run.id, run.experiment, stage);
                RunOutcome::Aborted(ErrorDetail::from_error(&stage, &e))
            }
            Err((stage, e)) => {
                error!(
                    "Run {} for '{}' failed during {}: {}",
                    run.id, run.experiment, stage, e
                );
                RunOutcome::Failed(ErrorDetail::from_error(&stage, &e))
            }
        };

        if let Err(e) = self.store.finish_run(run.id, outcome, row_counts) {
            error!("Failed to record the end of run {}: {}", run.id, e);
        }
        self.live_runs().remove(&run.id);
        let _ = done.send(true);
    }

    async fn generate_and_load(
        &self,
        run: &GenerationRun,
        schema: &Arc<ExperimentSchema>,
        abort: &AbortToken,
        row_counts: &mut BTreeMap<String, u64>,
    ) -> std::result::Result<(), StageError> {
        let stage = "generation".to_string();
        let seed = run.seed.unwrap_or_default();
        let engine = Arc::clone(&self.engine);
        let task_schema = Arc::clone(schema);
        let order = run.table_order.clone();
        let overrides = run.row_overrides.clone();
        let task_abort = abort.clone();

        let artifacts = tokio::task::spawn_blocking(move || {
            engine.generate(&task_schema, &order, &overrides, seed, &task_abort)
        })
        .await
        .map_err(|e| {
            (
                stage.clone(),
                SynthKitError::Other(format!("generation worker failed: {}", e)),
            )
        })?
        .map_err(|e| (stage.clone(), e))?;

        for (table, warning) in &artifacts.warnings {
            if let Err(e) = self.catalog.append_warning(&schema.name, table, warning) {
                warn!("Could not record warning for {}.{}: {}", schema.name, table, e);
            }
        }

        for output in &artifacts.tables {
            let stage = format!("load of table {}", output.table);
            if abort.is_aborted() {
                let e = SynthKitError::Aborted {
                    experiment: schema.name.clone(),
                    stage: stage.clone(),
                };
                return Err((stage, e));
            }
            let table = schema.table(&output.table).ok_or_else(|| {
                (
                    stage.clone(),
                    SynthKitError::Other(format!("no table '{}' in schema", output.table)),
                )
            })?;
            let report = self
                .router
                .load_table(schema, table, &output.artifacts)
                .await
                .map_err(|e| (stage.clone(), e))?;
            row_counts.insert(report.table, report.rows);
        }
        Ok(())
    }
}
