//! # Warehouse Router
//!
//! Picks the backend for each experiment and routes loads, queries and
//! resets to it. Resolution happens once per experiment and is cached:
//!
//! 1. the experiment's own `warehouse`, if that backend is configured;
//! 2. the `analytics` backend, if configured;
//! 3. the `cloud_emulator` backend, if configured;
//! 4. the `embedded` backend, which always exists (a SQLite file in the run
//!    state directory unless configured otherwise).
//!
//! One pool is opened per backend and shared by every experiment routed to it.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::config::{SynthKitConfig, WarehouseConfig};
use crate::error::Result;
use crate::schema::types::{ExperimentSchema, TableSchema};
use crate::warehouse::connection::{QueryResult, WarehouseConnection};
use crate::warehouse::loader::{load_table, LoadReport, TableLoad};
use crate::warehouse::{physical_table_name, quote_identifier, scope_query, Dialect, WarehouseKind};

/// File name of the default embedded warehouse inside the state directory.
pub const EMBEDDED_DB_FILE: &str = "warehouse.db";

/// A backend chosen for an experiment.
#[derive(Debug, Clone)]
pub struct ResolvedBackend {
    pub kind: WarehouseKind,
    pub connection: WarehouseConnection,
}

impl ResolvedBackend {
    pub fn dialect(&self) -> Dialect {
        self.connection.dialect()
    }
}

pub struct WarehouseRouter {
    urls: HashMap<WarehouseKind, String>,
    connections: tokio::sync::Mutex<HashMap<WarehouseKind, WarehouseConnection>>,
    resolved: Mutex<HashMap<String, WarehouseKind>>,
}

impl WarehouseRouter {
    /// Build a router from warehouse URLs. `state_dir` hosts the default
    /// embedded database when no embedded URL is configured.
    pub fn new(config: &WarehouseConfig, state_dir: &Path) -> Self {
        let mut urls = HashMap::new();
        if let Some(url) = &config.analytics {
            urls.insert(WarehouseKind::Analytics, url.clone());
        }
        if let Some(url) = &config.cloud_emulator {
            urls.insert(WarehouseKind::CloudEmulator, url.clone());
        }
        let embedded = config
            .embedded
            .clone()
            .unwrap_or_else(|| default_embedded_url(state_dir));
        urls.insert(WarehouseKind::Embedded, embedded);

        Self {
            urls,
            connections: tokio::sync::Mutex::new(HashMap::new()),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SynthKitConfig) -> Self {
        Self::new(&config.warehouse, &config.state_dir())
    }

    /// URL of a configured backend.
    pub fn backend_url(&self, kind: WarehouseKind) -> Option<&str> {
        self.urls.get(&kind).map(String::as_str)
    }

    /// The backend an experiment would be routed to, without connecting.
    pub fn choose_backend(&self, schema: &ExperimentSchema) -> WarehouseKind {
        if let Some(preferred) = &schema.warehouse {
            match preferred.parse::<WarehouseKind>() {
                Ok(kind) if self.urls.contains_key(&kind) => return kind,
                Ok(kind) => warn!(
                    "Experiment '{}' asks for the {} warehouse, which is not configured; falling back",
                    schema.name, kind
                ),
                Err(e) => warn!("Experiment '{}': {}; falling back", schema.name, e),
            }
        }
        WarehouseKind::FALLBACK_ORDER
            .into_iter()
            .find(|kind| self.urls.contains_key(kind))
            .unwrap_or(WarehouseKind::Embedded)
    }

    /// Resolve (once) and connect the backend for an experiment.
    pub async fn resolve(&self, schema: &ExperimentSchema) -> Result<ResolvedBackend> {
        let cached = self
            .resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&schema.name)
            .copied();
        let kind = match cached {
            Some(kind) => kind,
            None => {
                let kind = self.choose_backend(schema);
                info!("Experiment '{}' routed to the {} warehouse", schema.name, kind);
                self.resolved
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(schema.name.clone(), kind);
                kind
            }
        };

        let connection = self.connection(kind).await?;
        Ok(ResolvedBackend { kind, connection })
    }

    async fn connection(&self, kind: WarehouseKind) -> Result<WarehouseConnection> {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.get(&kind) {
            return Ok(conn.clone());
        }
        let url = self
            .urls
            .get(&kind)
            .or_else(|| self.urls.get(&WarehouseKind::Embedded))
            .cloned()
            .unwrap_or_default();
        let conn = WarehouseConnection::connect(&url).await?;
        debug!("Opened {} connection for the {} warehouse", conn.dialect(), kind);
        connections.insert(kind, conn.clone());
        Ok(conn)
    }

    /// Load one table's artifacts into its physical table.
    pub async fn load_table(
        &self,
        schema: &ExperimentSchema,
        table: &TableSchema,
        artifacts: &[PathBuf],
    ) -> Result<LoadReport> {
        let backend = self.resolve(schema).await?;
        let load = TableLoad {
            experiment: &schema.name,
            table,
            artifacts,
        };
        load_table(&backend.connection, &backend.kind.to_string(), &load).await
    }

    /// Run SQL against the experiment's backend. Logical table names are
    /// rewritten to physical ones first.
    pub async fn execute_query(&self, schema: &ExperimentSchema, sql: &str) -> Result<QueryResult> {
        let backend = self.resolve(schema).await?;
        let scoped = scope_query(sql, &schema.name, &table_names(schema), backend.dialect());
        debug!("{}: {}", schema.name, scoped);
        backend.connection.fetch_all(&schema.name, &scoped).await
    }

    /// Rows in one of the experiment's physical tables.
    pub async fn row_count(&self, schema: &ExperimentSchema, table: &str) -> Result<u64> {
        let backend = self.resolve(schema).await?;
        backend
            .connection
            .count_rows(&physical_table_name(&schema.name, table))
            .await
    }

    /// Row counts of every physical table the experiment has in the backend.
    pub async fn row_counts(&self, schema: &ExperimentSchema) -> Result<BTreeMap<String, u64>> {
        let backend = self.resolve(schema).await?;
        let mut counts = BTreeMap::new();
        for table in &schema.tables {
            let physical = physical_table_name(&schema.name, &table.name);
            if backend.connection.table_exists(&physical).await? {
                counts.insert(
                    table.name.clone(),
                    backend.connection.count_rows(&physical).await?,
                );
            }
        }
        Ok(counts)
    }

    /// Empty every existing physical table of the experiment. Table
    /// definitions stay in place. Returns the logical names truncated.
    pub async fn reset(&self, schema: &ExperimentSchema) -> Result<Vec<String>> {
        let backend = self.resolve(schema).await?;
        let dialect = backend.dialect();
        let mut truncated = Vec::new();

        for table in &schema.tables {
            let physical = physical_table_name(&schema.name, &table.name);
            if !backend.connection.table_exists(&physical).await? {
                continue;
            }
            let quoted = quote_identifier(&physical, dialect);
            let sql = match dialect {
                Dialect::Sqlite => format!("DELETE FROM {}", quoted),
                Dialect::Postgres | Dialect::MySql => format!("TRUNCATE TABLE {}", quoted),
            };
            backend.connection.execute(&physical, &sql).await?;
            truncated.push(table.name.clone());
        }

        info!(
            "Reset experiment '{}': truncated {} tables",
            schema.name,
            truncated.len()
        );
        Ok(truncated)
    }

    /// Close every open pool.
    pub async fn close(&self) {
        let connections = self.connections.lock().await;
        for conn in connections.values() {
            conn.close().await;
        }
    }
}

fn table_names(schema: &ExperimentSchema) -> Vec<String> {
    schema.tables.iter().map(|t| t.name.clone()).collect()
}

fn default_embedded_url(state_dir: &Path) -> String {
    format!("sqlite://{}", state_dir.join(EMBEDDED_DB_FILE).display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{ColumnSchema, ColumnType};

    fn schema(name: &str, warehouse: Option<&str>) -> ExperimentSchema {
        let mut schema = ExperimentSchema::new(name).with_table(
            TableSchema::new("items", 3)
                .with_column(ColumnSchema::new("id", ColumnType::Integer).unique()),
        );
        schema.warehouse = warehouse.map(str::to_string);
        schema
    }

    fn memory_config() -> WarehouseConfig {
        WarehouseConfig {
            embedded: Some("sqlite::memory:".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_fallback_order() {
        let dir = Path::new("/tmp/state");
        let embedded_only = WarehouseRouter::new(&WarehouseConfig::default(), dir);
        assert_eq!(
            embedded_only.choose_backend(&schema("a", None)),
            WarehouseKind::Embedded
        );
        assert_eq!(
            embedded_only.backend_url(WarehouseKind::Embedded),
            Some("sqlite:///tmp/state/warehouse.db")
        );

        let with_emulator = WarehouseRouter::new(
            &WarehouseConfig {
                cloud_emulator: Some("mysql://localhost/emu".to_string()),
                ..Default::default()
            },
            dir,
        );
        assert_eq!(
            with_emulator.choose_backend(&schema("a", None)),
            WarehouseKind::CloudEmulator
        );

        let full = WarehouseRouter::new(
            &WarehouseConfig {
                analytics: Some("postgres://localhost/a".to_string()),
                cloud_emulator: Some("mysql://localhost/emu".to_string()),
                embedded: None,
            },
            dir,
        );
        assert_eq!(full.choose_backend(&schema("a", None)), WarehouseKind::Analytics);
        assert_eq!(
            full.choose_backend(&schema("a", Some("embedded"))),
            WarehouseKind::Embedded
        );
    }

    #[test]
    fn test_unconfigured_preference_falls_back() {
        let router = WarehouseRouter::new(&WarehouseConfig::default(), Path::new("/tmp"));
        assert_eq!(
            router.choose_backend(&schema("a", Some("analytics"))),
            WarehouseKind::Embedded
        );
    }

    #[tokio::test]
    async fn test_query_and_reset_use_logical_names() {
        let router = WarehouseRouter::new(&memory_config(), Path::new("/tmp"));
        let shop = schema("shop", None);

        let backend = router.resolve(&shop).await.unwrap();
        assert_eq!(backend.kind, WarehouseKind::Embedded);
        backend
            .connection
            .execute("shop__items", "CREATE TABLE shop__items (id INTEGER)")
            .await
            .unwrap();
        backend
            .connection
            .execute("shop__items", "INSERT INTO shop__items VALUES (1), (2), (3)")
            .await
            .unwrap();

        let result = router
            .execute_query(&shop, "SELECT COUNT(*) AS n FROM items")
            .await
            .unwrap();
        assert_eq!(result.scalar(), Some("3"));
        assert_eq!(router.row_count(&shop, "items").await.unwrap(), 3);

        let truncated = router.reset(&shop).await.unwrap();
        assert_eq!(truncated, vec!["items".to_string()]);
        assert_eq!(router.row_counts(&shop).await.unwrap()["items"], 0);
    }

    #[tokio::test]
    async fn test_reset_skips_tables_never_loaded() {
        let router = WarehouseRouter::new(&memory_config(), Path::new("/tmp"));
        let truncated = router.reset(&schema("fresh", None)).await.unwrap();
        assert!(truncated.is_empty());
    }
}
