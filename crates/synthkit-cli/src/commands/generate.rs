use std::path::Path;

use anyhow::{bail, Result};
use comfy_table::{Cell, Table as ComfyTable};

use synthkit_core::RunStatus;

use super::{config, spinner, Session};
use crate::args::GenerateArgs;

pub async fn run(args: &GenerateArgs, dir: &Path) -> Result<()> {
    let mut config = config(dir)?;
    if let Some(workers) = args.workers {
        config.generation.workers = Some(workers);
    }
    if let Some(batch_size) = args.batch_size {
        config.generation.batch_size = batch_size;
    }
    config.validate()?;

    let session = Session::open(&config, &args.experiment.schema)?;
    let overrides = args.parse_table_rows()?;
    let orchestrator = &session.orchestrator;

    let backend = orchestrator.router().choose_backend(&session.schema);
    let pb = spinner(
        "1/1",
        format!(
            "Generating '{}' into the {} warehouse...",
            session.name(),
            backend
        ),
    )?;

    let run_id = orchestrator
        .start_generation(session.name(), overrides, args.seed)
        .await?;

    let run = tokio::select! {
        run = orchestrator.wait_for_run(run_id) => run?,
        _ = tokio::signal::ctrl_c() => {
            pb.set_message("Interrupted, aborting run...");
            orchestrator.abort_run(run_id)?;
            orchestrator.wait_for_run(run_id).await?
        }
    };

    if run.status != RunStatus::Completed {
        pb.abandon_with_message(format!("Generation {}", run.status));
        let detail = run
            .error
            .map(|e| {
                let mut lines = vec![e.message];
                lines.extend(e.trace.into_iter().map(|t| format!("  {}", t)));
                lines.join("\n")
            })
            .unwrap_or_default();
        bail!("run {} {}\n{}", run.id, run.status, detail);
    }

    let total: u64 = run.row_counts.values().sum();
    pb.finish_with_message(format!(
        "Generating '{}'... ✓ {} rows across {} tables",
        session.name(),
        total,
        run.row_counts.len()
    ));

    let mut table = ComfyTable::new();
    table.set_header(vec!["Table", "Rows"]);
    for name in &run.table_order {
        let rows = run.row_counts.get(name).copied().unwrap_or(0);
        table.add_row(vec![Cell::new(name), Cell::new(rows)]);
    }
    println!("{}", table);
    println!("Run {} (seed {})", run.id, run.seed.unwrap_or_default());

    orchestrator.router().close().await;
    Ok(())
}
