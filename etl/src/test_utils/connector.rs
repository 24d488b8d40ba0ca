use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tidb::types::{TableColumn, TableDefinition, TableName};
use tokio::sync::{Mutex, Notify};
use tracing::info;

use crate::bail;
use crate::changelog::{ResolvedChange, parse_change_log, resolve_batch, split_csv_line};
use crate::connector::{Connector, SqlExecutor};
use crate::dialect::bigquery::BigQueryDialect;
use crate::dialect::{Dialect, TargetTable, render_create_table};
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::storage::ExternalStorage;
use crate::storage::memory::MemoryStorage;
use crate::test_utils::notify::TimedNotify;

/// Executor that records every batch of statements instead of running it.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingExecutor {
    /// Returns the recorded batches, one per [`SqlExecutor::execute`] call.
    pub async fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().await.clone()
    }

    /// Returns every recorded statement in execution order.
    pub async fn statements(&self) -> Vec<String> {
        self.batches.lock().await.concat()
    }
}

impl SqlExecutor for RecordingExecutor {
    async fn execute(&self, statements: &[String]) -> EtlResult<()> {
        self.batches.lock().await.push(statements.to_vec());

        Ok(())
    }
}

/// Rows of a table keyed by their primary-key values.
pub type MemoryRows = BTreeMap<Vec<Option<String>>, BTreeMap<String, Option<String>>>;

#[derive(Debug, Default)]
struct Inner {
    /// Tables by qualified name.
    tables: HashMap<String, MemoryRows>,
    created_tables: Vec<String>,
    ddl_batches: Vec<Vec<String>>,
    snapshot_files: Vec<String>,
    increment_files: Vec<String>,
    failing_files: HashSet<String>,
    increment_file_conditions: Vec<(usize, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let applied = self.increment_files.len();
        self.increment_file_conditions.retain(|(count, notify)| {
            let reached = applied >= *count;
            if reached {
                notify.notify_one();
            }
            !reached
        });
    }

    fn apply_ddl(&mut self, statement: &str) {
        if let Some(name) = statement.strip_prefix("TRUNCATE TABLE ") {
            if let Some(rows) = self.tables.get_mut(name.trim()) {
                rows.clear();
            }
        } else if let Some(name) = statement.strip_prefix("DROP TABLE IF EXISTS ") {
            self.tables.remove(name.trim());
        }
    }
}

/// Warehouse double that keeps tables in memory.
///
/// Files are read back from the [`MemoryStorage`] the pipeline loads from. Snapshot files are
/// appended and change-log files are merged with the same dedup semantics as the generated
/// `MERGE`, so tests can assert on the resulting rows. Rows are maps keyed by column name, which
/// keeps them readable across added and dropped columns. DDL is recorded and `TRUNCATE` and
/// `DROP` are applied; other statements only change what the next files contain.
///
/// Clones share their state.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    storage: MemoryStorage,
    dialect: BigQueryDialect,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryConnector {
    pub fn new(storage: MemoryStorage) -> Self {
        Self {
            storage,
            dialect: BigQueryDialect,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub async fn row_count(&self, table: &TableName) -> usize {
        let key = self.table_key(table);
        let inner = self.inner.lock().await;
        inner.tables.get(&key).map(BTreeMap::len).unwrap_or_default()
    }

    /// Returns the row with the given primary-key values.
    pub async fn row(
        &self,
        table: &TableName,
        key: &[&str],
    ) -> Option<BTreeMap<String, Option<String>>> {
        let key: Vec<Option<String>> = key.iter().map(|value| Some((*value).to_owned())).collect();
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(&self.table_key(table))
            .and_then(|rows| rows.get(&key))
            .cloned()
    }

    pub async fn table_exists(&self, table: &TableName) -> bool {
        let inner = self.inner.lock().await;
        inner.tables.contains_key(&self.table_key(table))
    }

    /// Returns every rendered `CREATE TABLE` statement.
    pub async fn created_tables(&self) -> Vec<String> {
        self.inner.lock().await.created_tables.clone()
    }

    /// Returns the DDL batches executed after the destination table was created.
    pub async fn ddl_batches(&self) -> Vec<Vec<String>> {
        self.inner.lock().await.ddl_batches.clone()
    }

    /// Returns the storage paths of the loaded snapshot files, in load order.
    pub async fn snapshot_files(&self) -> Vec<String> {
        self.inner.lock().await.snapshot_files.clone()
    }

    /// Returns the storage paths of the applied change-log files, in apply order.
    pub async fn increment_files(&self) -> Vec<String> {
        self.inner.lock().await.increment_files.clone()
    }

    /// Makes every load of the file at storage path `path` fail.
    pub async fn fail_on(&self, path: &str) {
        self.inner.lock().await.failing_files.insert(path.to_owned());
    }

    pub async fn clear_failures(&self) {
        self.inner.lock().await.failing_files.clear();
    }

    /// Returns a notification fired once `count` change-log files have been applied in total.
    pub async fn wait_for_increment_files(&self, count: usize) -> TimedNotify {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner
            .increment_file_conditions
            .push((count, notify.clone()));
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    fn table_key(&self, table: &TableName) -> String {
        self.target_table(table).qualified(&self.dialect)
    }

    async fn read_file(&self, file_uri: &str) -> EtlResult<(String, Vec<u8>)> {
        let Some(path) = self.storage.uri().relative_path(file_uri) else {
            bail!(
                ErrorKind::InvalidData,
                "File is outside of the storage root",
                file_uri
            );
        };

        if self.inner.lock().await.failing_files.contains(path) {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Loading a file into the destination failed",
                path
            );
        }

        let contents = self.storage.read_file(path).await?;

        Ok((path.to_owned(), contents.to_vec()))
    }
}

fn key_of(columns: &[TableColumn], values: &[Option<String>]) -> Vec<Option<String>> {
    columns
        .iter()
        .zip(values)
        .filter(|(column, _)| column.is_primary_key)
        .map(|(_, value)| value.clone())
        .collect()
}

fn row_of(columns: &[TableColumn], values: Vec<Option<String>>) -> BTreeMap<String, Option<String>> {
    columns
        .iter()
        .map(|column| column.name.clone())
        .zip(values)
        .collect()
}

impl Connector for MemoryConnector {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn target_table(&self, table: &TableName) -> TargetTable {
        TargetTable::new(["memory"], table.name.clone())
    }

    async fn execute_ddl(&self, statements: &[String]) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        for statement in statements {
            inner.apply_ddl(statement);
        }
        inner.ddl_batches.push(statements.to_vec());

        Ok(())
    }

    async fn create_table(
        &self,
        table: &TableName,
        columns: &[TableColumn],
        replace: bool,
    ) -> EtlResult<()> {
        let target = self.target_table(table);
        let statement = render_create_table(&self.dialect, &target, columns, replace)?;
        info!(%table, %statement, "creating memory table");

        let key = target.qualified(&self.dialect);
        let mut inner = self.inner.lock().await;
        if replace || !inner.tables.contains_key(&key) {
            inner.tables.insert(key, MemoryRows::new());
        }
        inner.created_tables.push(statement);

        Ok(())
    }

    async fn load_snapshot_file(
        &self,
        table: &TableName,
        columns: &[TableColumn],
        file_uri: &str,
    ) -> EtlResult<()> {
        let (path, contents) = self.read_file(file_uri).await?;
        let contents = String::from_utf8(contents)?;

        let mut rows = Vec::new();
        for line in contents.lines().filter(|line| !line.is_empty()) {
            let values = split_csv_line(line)?;
            if values.len() != columns.len() {
                bail!(
                    ErrorKind::InvalidData,
                    "Snapshot row has an unexpected number of fields",
                    format!("{path}: expected {}, got {}", columns.len(), values.len())
                );
            }
            rows.push((key_of(columns, &values), row_of(columns, values)));
        }

        let key = self.table_key(table);
        let mut inner = self.inner.lock().await;
        let table_rows = inner.tables.get_mut(&key).ok_or_else(|| {
            etl_error!(
                ErrorKind::DestinationQueryFailed,
                "Destination table does not exist",
                key.clone()
            )
        })?;
        table_rows.extend(rows);
        inner.snapshot_files.push(path);

        Ok(())
    }

    async fn load_increment_file(
        &self,
        definition: &TableDefinition,
        file_uri: &str,
        _timezone: &str,
    ) -> EtlResult<()> {
        let (path, contents) = self.read_file(file_uri).await?;
        let rows = parse_change_log(&contents, definition.columns.len())?;
        let key_indices: Vec<usize> = definition
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_primary_key)
            .map(|(index, _)| index)
            .collect();

        let key = self.table_key(&definition.table_name());
        let mut inner = self.inner.lock().await;
        let table_rows = inner.tables.get_mut(&key).ok_or_else(|| {
            etl_error!(
                ErrorKind::DestinationQueryFailed,
                "Destination table does not exist",
                key.clone()
            )
        })?;
        for change in resolve_batch(&rows, &key_indices) {
            match change {
                ResolvedChange::Upsert { key, values } => {
                    table_rows.insert(key, row_of(&definition.columns, values));
                }
                ResolvedChange::Delete { key } => {
                    table_rows.remove(&key);
                }
            }
        }
        inner.increment_files.push(path);
        inner.check_conditions();

        Ok(())
    }
}
