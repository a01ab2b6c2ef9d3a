use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table as ComfyTable};

use synthkit_core::run::RunStore;

use super::config;
use crate::args::RunsArgs;

pub fn run(args: &RunsArgs, dir: &Path) -> Result<()> {
    let config = config(dir)?;
    let store = RunStore::open(config.state_dir())?;

    if let Some(secs) = args.recover_stale {
        // Nothing runs in this process, so every old RUNNING run is stale.
        let recovered = store.recover_stale(Duration::from_secs(secs), |_| false)?;
        for run in &recovered {
            println!("Marked run {} of '{}' as {}", run.id, run.experiment, run.status);
        }
    }

    let runs = store.list(args.experiment.as_deref());
    if runs.is_empty() {
        println!("No runs recorded in {}", store.dir().display());
        return Ok(());
    }

    let mut table = ComfyTable::new();
    table.set_header(vec!["Run", "Experiment", "Status", "Started", "Rows", "Error"]);
    for run in runs {
        let rows: u64 = run.row_counts.values().sum();
        table.add_row(vec![
            Cell::new(run.id),
            Cell::new(&run.experiment),
            Cell::new(run.status),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(rows),
            Cell::new(run.error.map(|e| e.message).unwrap_or_default()),
        ]);
    }
    println!("{}", table);
    Ok(())
}
