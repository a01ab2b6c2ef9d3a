use anyhow::Result;

use synthkit_core::graph::resolve_order;
use synthkit_core::schema::read_schema_file;
use synthkit_core::schema::validate::validate_schema;

use crate::args::SchemaArgs;

pub fn run(args: &SchemaArgs) -> Result<()> {
    let schema = read_schema_file(&args.schema)?;
    for (table, warning) in validate_schema(&schema)? {
        eprintln!("warning: {}: {}", table, warning);
    }
    let order = resolve_order(&schema)?;

    for (position, name) in order.tables.iter().enumerate() {
        let rows = schema.table(name).map(|t| t.target_rows).unwrap_or(0);
        println!("{:>3}. {} ({} rows)", position + 1, name, rows);
    }
    Ok(())
}
