//! # Table Loading
//!
//! Loads one table's batch artifacts into its physical warehouse table. The
//! physical table is created if missing. Inside a single transaction the
//! rows of any previous load are removed and the new rows go in, so the table
//! holds exactly one run's data and a failed load leaves it as it was.
//!
//! - **PostgreSQL**: `COPY ... FROM STDIN WITH (FORMAT csv)` fed from the
//!   artifacts, inside a savepoint. If the copy fails the savepoint is rolled
//!   back and the rows are inserted instead, in the same transaction.
//! - **MySQL / SQLite**: batched multi-row `INSERT` statements.
//!
//! If the insert path fails too, the transaction is rolled back and a
//! `WarehouseLoad` error carries both causes.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::postgres::PgConnection;
use tracing::{info, warn};

use crate::artifact::csv::encode_rows;
use crate::artifact::{read_batch, ArtifactColumn};
use crate::error::{Result, SynthKitError};
use crate::generate::engine::artifact_columns;
use crate::generate::value::Value;
use crate::schema::types::TableSchema;
use crate::warehouse::connection::query_error;
use crate::warehouse::{
    create_table_sql, physical_table_name, quote_identifier, Dialect, WarehouseConnection,
};

/// Rows per multi-row INSERT statement.
pub const INSERT_BATCH_SIZE: usize = 100;

/// How a table's rows reached the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMethod {
    Bulk,
    Insert,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub table: String,
    pub physical: String,
    pub rows: u64,
    pub method: LoadMethod,
}

/// One table's load request.
pub struct TableLoad<'a> {
    pub experiment: &'a str,
    pub table: &'a TableSchema,
    /// Batch artifacts in batch-index order.
    pub artifacts: &'a [PathBuf],
}

struct LoadContext<'a> {
    table: &'a str,
    physical: String,
    quoted_table: String,
    col_list: String,
    columns: Vec<ArtifactColumn>,
    artifacts: &'a [PathBuf],
    dialect: Dialect,
}

impl<'a> LoadContext<'a> {
    fn new(load: &TableLoad<'a>, dialect: Dialect) -> Self {
        let physical = physical_table_name(load.experiment, &load.table.name);
        let col_list = load
            .table
            .columns
            .iter()
            .map(|c| quote_identifier(&c.name, dialect))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            table: &load.table.name,
            quoted_table: quote_identifier(&physical, dialect),
            physical,
            col_list,
            columns: artifact_columns(load.table),
            artifacts: load.artifacts,
            dialect,
        }
    }

    fn report(&self, rows: u64, method: LoadMethod) -> LoadReport {
        LoadReport {
            table: self.table.to_string(),
            physical: self.physical.clone(),
            rows,
            method,
        }
    }

    fn load_error(&self, backend: &str, bulk_error: Option<String>, source: SynthKitError) -> SynthKitError {
        SynthKitError::WarehouseLoad {
            table: self.physical.clone(),
            backend: backend.to_string(),
            bulk_error: bulk_error
                .unwrap_or_else(|| format!("no bulk load path for {}", self.dialect)),
            source: Box::new(source),
        }
    }
}

/// Create the physical table if needed and load every artifact into it.
/// `backend` names the resolved backend in errors and logs.
pub async fn load_table(
    conn: &WarehouseConnection,
    backend: &str,
    load: &TableLoad<'_>,
) -> Result<LoadReport> {
    let ctx = LoadContext::new(load, conn.dialect());
    conn.execute(
        &ctx.physical,
        &create_table_sql(load.experiment, load.table, ctx.dialect),
    )
    .await?;

    let report = match conn {
        WarehouseConnection::Postgres(pool) => load_postgres(pool, backend, &ctx).await?,
        WarehouseConnection::MySql(pool) => load_mysql(pool, backend, &ctx).await?,
        WarehouseConnection::Sqlite(pool) => load_sqlite(pool, backend, &ctx).await?,
    };

    info!(
        "Loaded {} rows into {} ({} warehouse, {:?})",
        report.rows, report.physical, backend, report.method
    );
    Ok(report)
}

/// Insert every artifact's rows through `$conn` in statements of
/// `INSERT_BATCH_SIZE` rows. Evaluates to `Result<u64>` (rows inserted).
macro_rules! insert_artifacts {
    ($conn:expr, $ctx:expr) => {
        async {
            let ctx: &LoadContext<'_> = $ctx;
            let mut rows = 0u64;
            for path in ctx.artifacts {
                let columns = read_artifact(path, &ctx.columns).await?;
                for sql in insert_statements(ctx, &columns) {
                    sqlx::query(&sql)
                        .execute(&mut *$conn)
                        .await
                        .map_err(|e| query_error(&ctx.physical, "Batched INSERT failed", &sql, e))?;
                }
                rows += columns.first().map_or(0, Vec::len) as u64;
            }
            Ok::<u64, SynthKitError>(rows)
        }
    };
}

/// Remove the rows of a previous load through `$conn`. Evaluates to
/// `Result<()>`.
macro_rules! clear_rows {
    ($conn:expr, $ctx:expr) => {
        async {
            let ctx: &LoadContext<'_> = $ctx;
            let sql = clear_sql(ctx);
            sqlx::query(&sql)
                .execute(&mut *$conn)
                .await
                .map(|_| ())
                .map_err(|e| query_error(&ctx.physical, "Failed to clear previous rows", &sql, e))
        }
    };
}

/// MySQL's TRUNCATE commits implicitly, so only PostgreSQL uses it here.
fn clear_sql(ctx: &LoadContext<'_>) -> String {
    match ctx.dialect {
        Dialect::Postgres => format!("TRUNCATE TABLE {}", ctx.quoted_table),
        Dialect::MySql | Dialect::Sqlite => format!("DELETE FROM {}", ctx.quoted_table),
    }
}

fn begin_error(ctx: &LoadContext<'_>, e: sqlx::Error) -> SynthKitError {
    query_error(&ctx.physical, "Failed to begin transaction", "BEGIN", e)
}

fn commit_error(ctx: &LoadContext<'_>, e: sqlx::Error) -> SynthKitError {
    query_error(&ctx.physical, "Failed to commit transaction", "COMMIT", e)
}

// ---------------------------------------------------------------------------
// PostgreSQL: COPY in a savepoint, INSERT fallback
// ---------------------------------------------------------------------------

async fn load_postgres(pool: &sqlx::PgPool, backend: &str, ctx: &LoadContext<'_>) -> Result<LoadReport> {
    let mut tx = pool.begin().await.map_err(|e| begin_error(ctx, e))?;
    let cleared = clear_rows!(tx, ctx).await;
    if let Err(e) = cleared {
        let _ = tx.rollback().await;
        return Err(e);
    }

    let bulk_error = {
        let mut savepoint = sqlx::Connection::begin(&mut *tx)
            .await
            .map_err(|e| begin_error(ctx, e))?;
        match copy_artifacts(&mut savepoint, ctx).await {
            Ok(rows) => {
                savepoint.commit().await.map_err(|e| commit_error(ctx, e))?;
                tx.commit().await.map_err(|e| commit_error(ctx, e))?;
                return Ok(ctx.report(rows, LoadMethod::Bulk));
            }
            Err(e) => {
                warn!(
                    "COPY into {} failed, falling back to INSERT: {}",
                    ctx.physical, e
                );
                let _ = savepoint.rollback().await;
                e.to_string()
            }
        }
    };

    let inserted = insert_artifacts!(tx, ctx).await;
    match inserted {
        Ok(rows) => {
            tx.commit().await.map_err(|e| commit_error(ctx, e))?;
            Ok(ctx.report(rows, LoadMethod::Insert))
        }
        Err(e) => {
            let _ = tx.rollback().await;
            Err(ctx.load_error(backend, Some(bulk_error), e))
        }
    }
}

/// Stream every artifact into a single `COPY`, returning the rows copied.
async fn copy_artifacts(conn: &mut PgConnection, ctx: &LoadContext<'_>) -> Result<u64> {
    let sql = format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv)",
        ctx.quoted_table, ctx.col_list
    );
    let mut copy = conn
        .copy_in_raw(&sql)
        .await
        .map_err(|e| query_error(&ctx.physical, "COPY failed to start", &sql, e))?;

    let mut rows = 0u64;
    for path in ctx.artifacts {
        let columns = match read_artifact(path, &ctx.columns).await {
            Ok(columns) => columns,
            Err(e) => {
                let _ = copy.abort(e.to_string()).await;
                return Err(e);
            }
        };
        if let Err(e) = copy.send(encode_rows(&columns).into_bytes()).await {
            let _ = copy.abort(e.to_string()).await;
            return Err(query_error(&ctx.physical, "COPY data rejected", &sql, e));
        }
        rows += columns.first().map_or(0, Vec::len) as u64;
    }

    copy.finish()
        .await
        .map_err(|e| query_error(&ctx.physical, "COPY failed", &sql, e))?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// MySQL and SQLite: transactional batched INSERT
// ---------------------------------------------------------------------------

async fn load_mysql(pool: &sqlx::MySqlPool, backend: &str, ctx: &LoadContext<'_>) -> Result<LoadReport> {
    let mut tx = pool.begin().await.map_err(|e| begin_error(ctx, e))?;
    let cleared = clear_rows!(tx, ctx).await;
    if let Err(e) = cleared {
        let _ = tx.rollback().await;
        return Err(e);
    }
    let inserted = insert_artifacts!(tx, ctx).await;
    match inserted {
        Ok(rows) => {
            tx.commit().await.map_err(|e| commit_error(ctx, e))?;
            Ok(ctx.report(rows, LoadMethod::Insert))
        }
        Err(e) => {
            let _ = tx.rollback().await;
            Err(ctx.load_error(backend, None, e))
        }
    }
}

async fn load_sqlite(pool: &sqlx::SqlitePool, backend: &str, ctx: &LoadContext<'_>) -> Result<LoadReport> {
    let mut tx = pool.begin().await.map_err(|e| begin_error(ctx, e))?;
    let cleared = clear_rows!(tx, ctx).await;
    if let Err(e) = cleared {
        let _ = tx.rollback().await;
        return Err(e);
    }
    let inserted = insert_artifacts!(tx, ctx).await;
    match inserted {
        Ok(rows) => {
            tx.commit().await.map_err(|e| commit_error(ctx, e))?;
            Ok(ctx.report(rows, LoadMethod::Insert))
        }
        Err(e) => {
            let _ = tx.rollback().await;
            Err(ctx.load_error(backend, None, e))
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

async fn read_artifact(path: &Path, columns: &[ArtifactColumn]) -> Result<Vec<Vec<Value>>> {
    let (path, columns) = (path.to_path_buf(), columns.to_vec());
    tokio::task::spawn_blocking(move || read_batch(&path, &columns))
        .await
        .map_err(|e| SynthKitError::Other(format!("Artifact reader task failed: {}", e)))?
}

fn insert_statements(ctx: &LoadContext<'_>, columns: &[Vec<Value>]) -> Vec<String> {
    let rows = columns.first().map_or(0, Vec::len);
    (0..rows)
        .step_by(INSERT_BATCH_SIZE)
        .map(|start| {
            let end = (start + INSERT_BATCH_SIZE).min(rows);
            build_batched_insert(&ctx.quoted_table, &ctx.col_list, columns, start..end, ctx.dialect)
        })
        .collect()
}

/// Build a batched multi-row INSERT statement from column-major values.
///
/// Produces: `INSERT INTO "table" ("col1", "col2") VALUES (v1, v2), (v3, v4)`
pub fn build_batched_insert(
    quoted_table: &str,
    col_list: &str,
    columns: &[Vec<Value>],
    rows: std::ops::Range<usize>,
    dialect: Dialect,
) -> String {
    let mut sql = format!("INSERT INTO {} ({}) VALUES ", quoted_table, col_list);

    for (i, row) in rows.enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (j, column) in columns.iter().enumerate() {
            if j > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&column[row].to_sql_literal(dialect));
        }
        sql.push(')');
    }

    sql
}
