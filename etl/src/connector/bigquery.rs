use tidb::types::{TableColumn, TableDefinition, TableName};
use tracing::debug;
use uuid::Uuid;

use crate::connector::{Connector, SqlExecutor, staging_table_name};
use crate::dialect::bigquery::BigQueryDialect;
use crate::dialect::{Dialect, TargetTable, render_change_log_columns, render_merge};
use crate::error::EtlResult;

/// Null marker written by both the dump tool and the capture service.
const NULL_MARKER: &str = "\\N";

/// Loads into BigQuery with `LOAD DATA` statements reading straight from cloud storage.
#[derive(Debug)]
pub struct BigQueryConnector<E> {
    executor: E,
    project_id: String,
    dataset_id: String,
    dialect: BigQueryDialect,
}

impl<E> BigQueryConnector<E> {
    pub fn new(executor: E, project_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            executor,
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            dialect: BigQueryDialect,
        }
    }

    fn files_clause(&self, file_uri: &str) -> String {
        format!(
            "FROM FILES (format = 'CSV', uris = [{}], null_marker = {})",
            self.dialect.quote_literal(file_uri),
            self.dialect.quote_literal(NULL_MARKER)
        )
    }

    /// Renders the script applying one change-log file: the file is loaded into a temporary
    /// table that only lives for the script, then merged.
    fn increment_script(
        &self,
        target: &TargetTable,
        definition: &TableDefinition,
        file_uri: &str,
        timezone: &str,
    ) -> EtlResult<Vec<String>> {
        let staging = self.dialect.quote_identifier(&staging_table_name(Uuid::new_v4()));
        let columns = render_change_log_columns(&self.dialect, &definition.columns)?;

        Ok(vec![
            format!("SET @@time_zone = {}", self.dialect.quote_literal(timezone)),
            format!(
                "LOAD DATA INTO TEMP TABLE {staging} ({}) {}",
                columns.join(", "),
                self.files_clause(file_uri)
            ),
            render_merge(
                &self.dialect,
                &target.qualified(&self.dialect),
                &staging,
                &definition.columns,
            )?,
        ])
    }
}

impl<E: SqlExecutor> Connector for BigQueryConnector<E> {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn target_table(&self, table: &TableName) -> TargetTable {
        TargetTable::new([&self.project_id, &self.dataset_id], &table.name)
    }

    async fn execute_ddl(&self, statements: &[String]) -> EtlResult<()> {
        self.executor.execute(statements).await
    }

    async fn load_snapshot_file(
        &self,
        table: &TableName,
        _columns: &[TableColumn],
        file_uri: &str,
    ) -> EtlResult<()> {
        let statement = format!(
            "LOAD DATA INTO {} {}",
            self.target_table(table).qualified(&self.dialect),
            self.files_clause(file_uri)
        );
        debug!(%table, file_uri, "loading snapshot file into bigquery");

        self.executor.execute(&[statement]).await
    }

    async fn load_increment_file(
        &self,
        definition: &TableDefinition,
        file_uri: &str,
        timezone: &str,
    ) -> EtlResult<()> {
        let target = self.target_table(&definition.table_name());
        let script = self.increment_script(&target, definition, file_uri, timezone)?;

        self.executor.execute(&script).await
    }
}
