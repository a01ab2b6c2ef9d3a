use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "synthkit",
    about = "Generate constraint-safe synthetic experiments and load them into a warehouse",
    version,
    after_help = "Examples:\n  synthkit generate --schema shop.json --seed 42\n  synthkit generate --schema shop.toml --table-rows orders=50000 --workers 8\n  synthkit query --schema shop.json \"SELECT COUNT(*) FROM orders\"\n  synthkit reset --schema shop.json\n  synthkit order --schema shop.json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding synthkit.toml and .env
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an experiment and load it into its warehouse
    Generate(GenerateArgs),

    /// Truncate every table of an experiment
    Reset(SchemaArgs),

    /// Run SQL against an experiment's tables
    Query(QueryArgs),

    /// Print the generation order without generating anything
    Order(SchemaArgs),

    /// List recorded generation runs
    Runs(RunsArgs),
}

#[derive(Parser, Debug)]
pub struct SchemaArgs {
    /// Experiment schema document (.json or .toml)
    #[arg(long, env = "SYNTHKIT_SCHEMA")]
    pub schema: PathBuf,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub experiment: SchemaArgs,

    /// Random seed for deterministic generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Per-table row count overrides (e.g., customers=500,orders=2000)
    #[arg(long, value_delimiter = ',')]
    pub table_rows: Vec<String>,

    /// Worker threads (default: from synthkit.toml, else cores - 1)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Rows per batch (default: from synthkit.toml, else 10000)
    #[arg(long)]
    pub batch_size: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub experiment: SchemaArgs,

    /// SQL to run; table names may omit the experiment prefix
    pub sql: String,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: QueryFormat,
}

#[derive(Parser, Debug)]
pub struct RunsArgs {
    /// Only show runs of this experiment
    #[arg(long)]
    pub experiment: Option<String>,

    /// Mark RUNNING runs older than this many seconds as ABORTED first
    #[arg(long)]
    pub recover_stale: Option<u64>,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum QueryFormat {
    Table,
    Json,
}

impl GenerateArgs {
    /// Parse table row overrides like "customers=500,orders=2000".
    pub fn parse_table_rows(&self) -> Result<BTreeMap<String, u64>> {
        parse_table_rows(&self.table_rows)
    }
}

fn parse_table_rows(entries: &[String]) -> Result<BTreeMap<String, u64>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let Some((table, count)) = entry.split_once('=') else {
            bail!("invalid --table-rows entry '{}', expected table=count", entry);
        };
        let count = count
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid row count in --table-rows entry '{}'", entry))?;
        map.insert(table.trim().to_string(), count);
    }
    Ok(map)
}
