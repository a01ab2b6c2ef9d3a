use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Table as ComfyTable};

use super::{config, Session};
use crate::args::{QueryArgs, QueryFormat};

pub async fn run(args: &QueryArgs, dir: &Path) -> Result<()> {
    let config = config(dir)?;
    let session = Session::open(&config, &args.experiment.schema)?;
    let router = session.orchestrator.router();

    let result = router.execute_query(&session.schema, &args.sql).await?;

    match args.format {
        QueryFormat::Json => {
            let rows: Vec<serde_json::Map<String, serde_json::Value>> = result
                .rows
                .iter()
                .map(|row| {
                    result
                        .columns
                        .iter()
                        .zip(row)
                        .map(|(col, cell)| {
                            let value = cell
                                .clone()
                                .map_or(serde_json::Value::Null, serde_json::Value::String);
                            (col.clone(), value)
                        })
                        .collect()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        QueryFormat::Table => {
            if result.columns.is_empty() {
                println!("({} rows)", result.row_count());
            } else {
                let mut table = ComfyTable::new();
                table.set_header(result.columns.clone());
                for row in &result.rows {
                    table.add_row(
                        row.iter()
                            .map(|cell| Cell::new(cell.as_deref().unwrap_or("NULL"))),
                    );
                }
                println!("{}", table);
                println!("({} rows)", result.row_count());
            }
        }
    }

    router.close().await;
    Ok(())
}
