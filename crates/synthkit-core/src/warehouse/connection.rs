use std::str::FromStr;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo};

use crate::error::{Result, SynthKitError};
use crate::warehouse::{dialect_from_url, quote_identifier, sanitize_url, truncate_sql, Dialect};

/// Connections held open per network backend. Loads run on one connection at
/// a time; the second lets a query proceed while a load holds the first.
const NETWORK_MAX_CONNECTIONS: u32 = 2;

/// An open connection pool to one warehouse backend.
#[derive(Debug, Clone)]
pub enum WarehouseConnection {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Rows returned by an ad-hoc query, rendered as text. `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The single cell of a one-row, one-column result.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

impl WarehouseConnection {
    /// Open a pool for a backend URL. SQLite database files (and their parent
    /// directories) are created when missing.
    pub async fn connect(url: &str) -> Result<Self> {
        let connection_error = |message: &str, e: sqlx::Error| SynthKitError::Connection {
            message: message.to_string(),
            connection_hint: sanitize_url(url),
            source: e,
        };

        match dialect_from_url(url)? {
            Dialect::Postgres => PgPoolOptions::new()
                .max_connections(NETWORK_MAX_CONNECTIONS)
                .connect(url)
                .await
                .map(WarehouseConnection::Postgres)
                .map_err(|e| connection_error("Failed to connect to PostgreSQL warehouse", e)),
            Dialect::MySql => MySqlPoolOptions::new()
                .max_connections(NETWORK_MAX_CONNECTIONS)
                .connect(url)
                .await
                .map(WarehouseConnection::MySql)
                .map_err(|e| connection_error("Failed to connect to MySQL warehouse", e)),
            Dialect::Sqlite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(|e| connection_error("Invalid SQLite warehouse URL", e))?
                    .create_if_missing(true);

                let file = options.get_filename();
                if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| SynthKitError::Output {
                        message: format!("Failed to create warehouse directory {}", parent.display()),
                        source: e,
                    })?;
                }

                // One connection, never recycled, so in-memory databases
                // survive between statements.
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
                    .map(WarehouseConnection::Sqlite)
                    .map_err(|e| connection_error("Failed to open SQLite warehouse", e))
            }
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            WarehouseConnection::Postgres(_) => Dialect::Postgres,
            WarehouseConnection::MySql(_) => Dialect::MySql,
            WarehouseConnection::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Execute a statement, returning the number of affected rows.
    pub async fn execute(&self, context: &str, sql: &str) -> Result<u64> {
        let result = match self {
            WarehouseConnection::Postgres(pool) => {
                sqlx::query(sql).execute(pool).await.map(|r| r.rows_affected())
            }
            WarehouseConnection::MySql(pool) => {
                sqlx::query(sql).execute(pool).await.map(|r| r.rows_affected())
            }
            WarehouseConnection::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await.map(|r| r.rows_affected())
            }
        };
        result.map_err(|e| query_error(context, "Statement failed", sql, e))
    }

    /// Run a query and render every cell as text.
    pub async fn fetch_all(&self, context: &str, sql: &str) -> Result<QueryResult> {
        let map_err = |e| query_error(context, "Query failed", sql, e);
        match self {
            WarehouseConnection::Postgres(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await.map_err(map_err)?;
                Ok(render_rows(&rows, render_pg_cell))
            }
            WarehouseConnection::MySql(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await.map_err(map_err)?;
                Ok(render_rows(&rows, render_mysql_cell))
            }
            WarehouseConnection::Sqlite(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await.map_err(map_err)?;
                Ok(render_rows(&rows, render_sqlite_cell))
            }
        }
    }

    /// Whether a physical table exists in the backend.
    pub async fn table_exists(&self, physical: &str) -> Result<bool> {
        let result = match self {
            WarehouseConnection::Postgres(pool) => {
                let sql = "SELECT COUNT(*) FROM information_schema.tables \
                           WHERE table_schema = current_schema() AND table_name = $1";
                sqlx::query_as::<_, (i64,)>(sql)
                    .bind(physical)
                    .fetch_one(pool)
                    .await
            }
            WarehouseConnection::MySql(pool) => {
                let sql = "SELECT COUNT(*) FROM information_schema.tables \
                           WHERE table_schema = DATABASE() AND table_name = ?";
                sqlx::query_as::<_, (i64,)>(sql)
                    .bind(physical)
                    .fetch_one(pool)
                    .await
            }
            WarehouseConnection::Sqlite(pool) => {
                let sql = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?";
                sqlx::query_as::<_, (i64,)>(sql)
                    .bind(physical)
                    .fetch_one(pool)
                    .await
            }
        };
        result
            .map(|(count,)| count > 0)
            .map_err(|e| query_error(physical, "Table lookup failed", "information_schema.tables", e))
    }

    /// `COUNT(*)` of a physical table.
    pub async fn count_rows(&self, physical: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            quote_identifier(physical, self.dialect())
        );
        let result = match self {
            WarehouseConnection::Postgres(pool) => {
                sqlx::query_as::<_, (i64,)>(&sql).fetch_one(pool).await
            }
            WarehouseConnection::MySql(pool) => {
                sqlx::query_as::<_, (i64,)>(&sql).fetch_one(pool).await
            }
            WarehouseConnection::Sqlite(pool) => {
                sqlx::query_as::<_, (i64,)>(&sql).fetch_one(pool).await
            }
        };
        result
            .map(|(count,)| count.max(0) as u64)
            .map_err(|e| query_error(physical, "Row count failed", &sql, e))
    }

    pub async fn close(&self) {
        match self {
            WarehouseConnection::Postgres(pool) => pool.close().await,
            WarehouseConnection::MySql(pool) => pool.close().await,
            WarehouseConnection::Sqlite(pool) => pool.close().await,
        }
    }
}

pub(crate) fn query_error(table: &str, message: &str, sql: &str, source: sqlx::Error) -> SynthKitError {
    SynthKitError::Query {
        table: table.to_string(),
        message: message.to_string(),
        sql_preview: truncate_sql(sql, 200),
        source,
    }
}

fn render_rows<R: Row>(rows: &[R], cell: fn(&R, usize) -> Option<String>) -> QueryResult {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| cell(row, i)).collect())
        .collect();
    QueryResult { columns, rows }
}

/// Try each type in turn; the first one the column decodes as wins.
/// NULL decodes as any type.
macro_rules! render_cell {
    ($row:expr, $idx:expr; $($ty:ty),+ $(,)?) => {{
        let row = $row;
        let idx = $idx;
        let mut rendered: Option<Option<String>> = None;
        $(
            if rendered.is_none() {
                if let Ok(value) = row.try_get::<Option<$ty>, _>(idx) {
                    rendered = Some(value.map(|v| v.to_string()));
                }
            }
        )+
        rendered.unwrap_or_else(|| {
            Some(format!("<{}>", row.columns()[idx].type_info().name()))
        })
    }};
}

fn render_pg_cell(row: &PgRow, idx: usize) -> Option<String> {
    render_cell!(
        row, idx;
        String,
        i64,
        i32,
        i16,
        f64,
        f32,
        bool,
        chrono::NaiveDate,
        chrono::NaiveDateTime,
        chrono::NaiveTime,
        chrono::DateTime<chrono::Utc>,
        uuid::Uuid,
    )
}

fn render_mysql_cell(row: &MySqlRow, idx: usize) -> Option<String> {
    render_cell!(
        row, idx;
        String,
        i64,
        u64,
        f64,
        f32,
        bool,
        chrono::NaiveDate,
        chrono::NaiveDateTime,
        chrono::NaiveTime,
    )
}

fn render_sqlite_cell(row: &SqliteRow, idx: usize) -> Option<String> {
    render_cell!(row, idx; i64, f64, String)
}
