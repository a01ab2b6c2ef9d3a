//! # Run Store
//!
//! Persists generation runs as one JSON file per run (`<state_dir>/<id>.json`)
//! and holds the per-experiment lease: at most one generation run or reset
//! may be active for an experiment at a time. The lease check and the write
//! that claims it happen under one mutex, so two callers can never both win.
//!
//! Runs found RUNNING on disk when the store is opened belong to a process
//! that is gone (or still going). They keep their experiment's lease until
//! `recover_stale` marks them ABORTED.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, SynthKitError};
use crate::run::types::{ErrorDetail, GenerationRun, RunOutcome};

/// Who holds an experiment's lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lease {
    Run(Uuid),
    Reset,
}

#[derive(Default)]
struct StoreState {
    runs: HashMap<Uuid, GenerationRun>,
    leases: HashMap<String, Lease>,
}

pub struct RunStore {
    dir: PathBuf,
    state: Mutex<StoreState>,
}

/// Releases a reset lease when dropped.
pub struct ResetLease<'a> {
    store: &'a RunStore,
    experiment: String,
}

impl Drop for ResetLease<'_> {
    fn drop(&mut self) {
        let mut state = self.store.lock();
        if state.leases.get(&self.experiment) == Some(&Lease::Reset) {
            state.leases.remove(&self.experiment);
        }
    }
}

impl RunStore {
    /// Open (creating if needed) a state directory and load its runs.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SynthKitError::Output {
            message: format!("Failed to create run state directory {}", dir.display()),
            source: e,
        })?;

        let mut state = StoreState::default();
        let entries = fs::read_dir(&dir).map_err(|e| SynthKitError::Output {
            message: format!("Failed to list run state directory {}", dir.display()),
            source: e,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_run(&path) {
                Ok(run) => {
                    if run.is_running() {
                        warn!(
                            "Run {} for '{}' was left RUNNING by an earlier process",
                            run.id, run.experiment
                        );
                        state.leases.insert(run.experiment.clone(), Lease::Run(run.id));
                    }
                    state.runs.insert(run.id, run);
                }
                Err(e) => warn!("Skipping unreadable run file {}: {}", path.display(), e),
            }
        }

        Ok(Self {
            dir,
            state: Mutex::new(state),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Claim the experiment's lease for a new RUNNING run and persist it.
    pub fn begin_run(&self, run: GenerationRun) -> Result<GenerationRun> {
        let mut state = self.lock();
        if let Some(lease) = state.leases.get(&run.experiment) {
            return Err(concurrent(&run.experiment, *lease));
        }
        write_run(&self.run_path(run.id), &run)?;
        state.leases.insert(run.experiment.clone(), Lease::Run(run.id));
        state.runs.insert(run.id, run.clone());
        info!("Run {} started for '{}'", run.id, run.experiment);
        Ok(run)
    }

    /// Move a run to its terminal state, persist it and release the lease.
    pub fn finish_run(
        &self,
        id: Uuid,
        outcome: RunOutcome,
        row_counts: BTreeMap<String, u64>,
    ) -> Result<GenerationRun> {
        let mut state = self.lock();
        let run = state
            .runs
            .get_mut(&id)
            .ok_or_else(|| SynthKitError::RunNotFound(id.to_string()))?;
        run.finish(outcome, row_counts)?;
        let run = run.clone();

        if state.leases.get(&run.experiment) == Some(&Lease::Run(id)) {
            state.leases.remove(&run.experiment);
        }
        write_run(&self.run_path(id), &run)?;
        info!("Run {} for '{}' finished: {}", run.id, run.experiment, run.status);
        Ok(run)
    }

    /// Claim the experiment's lease for a reset.
    pub fn acquire_reset(&self, experiment: &str) -> Result<ResetLease<'_>> {
        let mut state = self.lock();
        if let Some(lease) = state.leases.get(experiment) {
            return Err(concurrent(experiment, *lease));
        }
        state.leases.insert(experiment.to_string(), Lease::Reset);
        Ok(ResetLease {
            store: self,
            experiment: experiment.to_string(),
        })
    }

    pub fn get(&self, id: Uuid) -> Result<GenerationRun> {
        self.lock()
            .runs
            .get(&id)
            .cloned()
            .ok_or_else(|| SynthKitError::RunNotFound(id.to_string()))
    }

    /// Runs, oldest first, optionally for one experiment.
    pub fn list(&self, experiment: Option<&str>) -> Vec<GenerationRun> {
        let mut runs: Vec<GenerationRun> = self
            .lock()
            .runs
            .values()
            .filter(|r| experiment.map_or(true, |e| r.experiment == e))
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    /// The RUNNING run holding an experiment's lease, if any.
    pub fn active_run(&self, experiment: &str) -> Option<Uuid> {
        match self.lock().leases.get(experiment) {
            Some(Lease::Run(id)) => Some(*id),
            _ => None,
        }
    }

    /// Mark RUNNING runs started more than `max_age` ago as ABORTED and
    /// release their leases. Runs for which `is_live` returns true are
    /// left alone.
    pub fn recover_stale<F>(&self, max_age: Duration, is_live: F) -> Result<Vec<GenerationRun>>
    where
        F: Fn(Uuid) -> bool,
    {
        let max_age = chrono::Duration::from_std(max_age).map_err(|e| SynthKitError::Config {
            message: format!("stale run threshold out of range: {}", e),
        })?;
        let cutoff = Utc::now() - max_age;

        let stale: Vec<Uuid> = self
            .lock()
            .runs
            .values()
            .filter(|r| r.is_running() && r.started_at < cutoff && !is_live(r.id))
            .map(|r| r.id)
            .collect();

        let mut recovered = Vec::with_capacity(stale.len());
        for id in stale {
            let detail = ErrorDetail::new(format!(
                "stale run: still RUNNING after {}s with no owning process",
                max_age.num_seconds()
            ));
            let partial = self.get(id)?.row_counts;
            let run = self.finish_run(id, RunOutcome::Aborted(detail), partial)?;
            warn!("Marked stale run {} for '{}' as ABORTED", run.id, run.experiment);
            recovered.push(run);
        }
        Ok(recovered)
    }
}

fn concurrent(experiment: &str, lease: Lease) -> SynthKitError {
    let activity = match lease {
        Lease::Run(id) => format!("generation run {}", id),
        Lease::Reset => "reset".to_string(),
    };
    SynthKitError::ConcurrentRun {
        experiment: experiment.to_string(),
        activity,
    }
}

/// Write a run file atomically: temp file, fsync, rename.
fn write_run(path: &Path, run: &GenerationRun) -> Result<()> {
    let json = serde_json::to_string_pretty(run).map_err(|e| SynthKitError::Other(format!(
        "Failed to serialize run {}: {}",
        run.id, e
    )))?;

    let tmp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp_path).map_err(|e| SynthKitError::Output {
        message: format!("Failed to create {}", tmp_path.display()),
        source: e,
    })?;
    file.write_all(json.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| SynthKitError::Output {
            message: format!("Failed to write {}", tmp_path.display()),
            source: e,
        })?;

    fs::rename(&tmp_path, path).map_err(|e| SynthKitError::Output {
        message: format!("Failed to move run file into place at {}", path.display()),
        source: e,
    })
}

fn read_run(path: &Path) -> Result<GenerationRun> {
    let content = fs::read_to_string(path).map_err(|e| SynthKitError::Output {
        message: format!("Failed to read run file {}", path.display()),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| SynthKitError::Other(format!(
        "Failed to parse run file {}: {}",
        path.display(),
        e
    )))
}
