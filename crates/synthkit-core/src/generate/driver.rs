//! # Parallel Execution Driver
//!
//! Runs one table at a time through four phases:
//!
//! 1. generate every batch on a pool of scoped worker threads;
//! 2. reconcile unique string columns across batches, in batch-index order;
//! 3. write batch artifacts, again in parallel;
//! 4. fold referenced columns into the parent key pools.
//!
//! Workers pull batch indices from a shared counter and send results back
//! over a channel. They share nothing mutable: the plan, provider and parent
//! pools are read-only. A failure stops workers from taking new batches, and
//! the error of the lowest failing batch index is returned, so the reported
//! error does not depend on thread timing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use tracing::debug;

use crate::artifact::{ArtifactColumn, ArtifactStore};
use crate::error::{Result, SynthKitError};
use crate::generate::batch::{generate_batch, GeneratedBatch};
use crate::generate::foreign_key::KeyPoolAccumulator;
use crate::generate::plan::TablePlan;
use crate::generate::providers::RealisticValueProvider;
use crate::generate::unique::{reconcile_batch, UniqueLedger};

/// Cooperative cancellation flag, checked between batches and between tables.
#[derive(Debug, Clone, Default)]
pub struct AbortToken(Arc<AtomicBool>);

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one table produced.
#[derive(Debug, Clone)]
pub struct TableOutput {
    pub table: String,
    pub rows: u64,
    /// Artifact paths in batch-index order.
    pub artifacts: Vec<PathBuf>,
}

pub struct ParallelDriver {
    experiment: String,
    workers: usize,
    abort: AbortToken,
}

impl ParallelDriver {
    pub fn new(experiment: &str, workers: usize, abort: AbortToken) -> Self {
        Self {
            experiment: experiment.to_string(),
            workers: workers.max(1),
            abort,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fail with `Aborted` if the abort token has been set.
    pub fn check_abort(&self, stage: &str) -> Result<()> {
        if self.abort.is_aborted() {
            return Err(SynthKitError::Aborted {
                experiment: self.experiment.clone(),
                stage: stage.to_string(),
            });
        }
        Ok(())
    }

    /// Run `job` for every index in `0..count` on the worker pool and return
    /// the results in index order.
    pub fn execute<T, F>(&self, stage: &str, count: u64, job: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(u64) -> Result<T> + Sync,
    {
        if count == 0 {
            return Ok(Vec::new());
        }

        let next = AtomicU64::new(0);
        let failed = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<(u64, Result<T>)>();
        let threads = (self.workers as u64).min(count) as usize;

        std::thread::scope(|scope| {
            for _ in 0..threads {
                let tx = tx.clone();
                let (next, failed, job) = (&next, &failed, &job);
                scope.spawn(move || loop {
                    if failed.load(Ordering::SeqCst) || self.abort.is_aborted() {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= count {
                        break;
                    }
                    let result = job(index);
                    if result.is_err() {
                        failed.store(true, Ordering::SeqCst);
                    }
                    if tx.send((index, result)).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
        let mut first_error: Option<(u64, SynthKitError)> = None;
        for (index, result) in rx {
            match result {
                Ok(value) => slots[index as usize] = Some(value),
                Err(e) => {
                    if first_error.as_ref().map_or(true, |(i, _)| index < *i) {
                        first_error = Some((index, e));
                    }
                }
            }
        }

        if let Some((_, e)) = first_error {
            return Err(e);
        }
        self.check_abort(stage)?;

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    SynthKitError::Other(format!("{}: batch {} produced no result", stage, i))
                })
            })
            .collect()
    }

    /// Generate, reconcile, write and pool one table.
    pub fn run_table(
        &self,
        plan: &TablePlan,
        columns: &[ArtifactColumn],
        provider: &dyn RealisticValueProvider,
        store: &ArtifactStore,
        pools: &mut KeyPoolAccumulator,
    ) -> Result<TableOutput> {
        let stage = format!("table {}", plan.table);
        self.check_abort(&stage)?;

        debug!(
            "{}: {} rows in {} batches of {} on {} workers",
            plan.table,
            plan.target_rows,
            plan.batch_count(),
            plan.batch_size,
            self.workers
        );

        // Phase 1: parallel generation.
        let mut batches = self.execute(&stage, plan.batch_count(), |b| {
            generate_batch(plan, plan.batch(b), provider)
        })?;

        // Phase 2: cross-batch uniqueness, deterministic order.
        if plan.has_unique_strings() {
            let mut ledger = UniqueLedger::new();
            ledger.max_retries = plan.max_unique_retries;
            for batch in &mut batches {
                self.check_abort(&stage)?;
                let seed = plan.batch(batch.index).seed;
                reconcile_batch(&mut ledger, plan, batch, seed, provider)?;
            }
        }

        // Phase 3: artifacts. Nothing is left behind if any write fails.
        self.check_abort(&stage)?;
        store.reset_table_dir(&self.experiment, &plan.table)?;
        let written = self.execute(&stage, batches.len() as u64, |b| {
            store.write_batch(&self.experiment, columns, &batches[b as usize])
        });
        let artifacts = match written {
            Ok(paths) => paths,
            Err(e) => {
                store.remove_table_dir(&self.experiment, &plan.table)?;
                return Err(e);
            }
        };

        // Phase 4: parent pools for later foreign keys.
        if !pools.is_empty() {
            for batch in &batches {
                pools.record_batch(batch);
            }
        }

        let rows = batches.iter().map(|b: &GeneratedBatch| b.row_count() as u64).sum::<u64>();
        Ok(TableOutput {
            table: plan.table.clone(),
            rows,
            artifacts,
        })
    }
}
