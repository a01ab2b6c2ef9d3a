use std::path::Path;

use anyhow::Result;

use super::{config, Session};
use crate::args::SchemaArgs;

pub async fn run(args: &SchemaArgs, dir: &Path) -> Result<()> {
    let config = config(dir)?;
    let session = Session::open(&config, &args.schema)?;

    let truncated = session
        .orchestrator
        .reset_experiment(session.name())
        .await?;

    if truncated.is_empty() {
        println!("Experiment '{}' has no loaded tables", session.name());
    } else {
        println!(
            "Reset '{}': truncated {}",
            session.name(),
            truncated.join(", ")
        );
    }

    session.orchestrator.router().close().await;
    Ok(())
}
