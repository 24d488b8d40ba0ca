use tidb::types::{TableColumn, TableDefinition, TableName};
use tracing::debug;

use crate::connector::{Connector, SqlExecutor};
use crate::dialect::databricks::DatabricksDialect;
use crate::dialect::{Dialect, TargetTable, render_change_log_columns, render_merge};
use crate::error::EtlResult;

const NULL_MARKER: &str = "\\N";

/// Loads into Databricks SQL with `COPY INTO` for snapshots and `read_files` for change logs.
#[derive(Debug)]
pub struct DatabricksConnector<E> {
    executor: E,
    catalog: String,
    schema: String,
    dialect: DatabricksDialect,
}

impl<E> DatabricksConnector<E> {
    pub fn new(executor: E, catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            executor,
            catalog: catalog.into(),
            schema: schema.into(),
            dialect: DatabricksDialect,
        }
    }

    /// Headerless CSV columns are read positionally as `_c0`, `_c1`, ... and cast to the
    /// destination types.
    fn snapshot_projection(&self, columns: &[TableColumn]) -> EtlResult<String> {
        let projection = columns
            .iter()
            .enumerate()
            .map(|(position, column)| {
                Ok(format!(
                    "CAST(_c{position} AS {}) AS {}",
                    self.dialect.column_type(column)?,
                    self.dialect.quote_identifier(&column.name)
                ))
            })
            .collect::<EtlResult<Vec<_>>>()?;

        Ok(projection.join(", "))
    }

    fn change_log_source(
        &self,
        definition: &TableDefinition,
        file_uri: &str,
        timezone: &str,
    ) -> EtlResult<String> {
        let schema = render_change_log_columns(&self.dialect, &definition.columns)?.join(", ");

        Ok(format!(
            "read_files({}, format => 'csv', header => false, schema => {}, timeZone => {}, nullValue => {})",
            self.dialect.quote_literal(file_uri),
            self.dialect.quote_literal(&schema),
            self.dialect.quote_literal(timezone),
            self.dialect.quote_literal(NULL_MARKER)
        ))
    }
}

impl<E: SqlExecutor> Connector for DatabricksConnector<E> {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn target_table(&self, table: &TableName) -> TargetTable {
        TargetTable::new([&self.catalog, &self.schema], &table.name)
    }

    async fn execute_ddl(&self, statements: &[String]) -> EtlResult<()> {
        self.executor.execute(statements).await
    }

    async fn load_snapshot_file(
        &self,
        table: &TableName,
        columns: &[TableColumn],
        file_uri: &str,
    ) -> EtlResult<()> {
        let statement = format!(
            "COPY INTO {} FROM (SELECT {} FROM {}) FILEFORMAT = CSV FORMAT_OPTIONS ('header' = 'false', 'nullValue' = {}) COPY_OPTIONS ('force' = 'true')",
            self.target_table(table).qualified(&self.dialect),
            self.snapshot_projection(columns)?,
            self.dialect.quote_literal(file_uri),
            self.dialect.quote_literal(NULL_MARKER)
        );
        debug!(%table, file_uri, "copying snapshot file into databricks");

        self.executor.execute(&[statement]).await
    }

    async fn load_increment_file(
        &self,
        definition: &TableDefinition,
        file_uri: &str,
        timezone: &str,
    ) -> EtlResult<()> {
        let target = self.target_table(&definition.table_name());
        let source = self.change_log_source(definition, file_uri, timezone)?;
        let merge = render_merge(
            &self.dialect,
            &target.qualified(&self.dialect),
            &source,
            &definition.columns,
        )?;

        self.executor.execute(&[merge]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::connector::RecordingExecutor;

    fn columns() -> Vec<TableColumn> {
        vec![
            TableColumn::new("id", "INT").primary_key(),
            TableColumn::new("name", "VARCHAR").with_precision(32),
        ]
    }

    #[tokio::test]
    async fn copies_snapshot_files_with_positional_casts() {
        let executor = RecordingExecutor::default();
        let connector = DatabricksConnector::new(executor.clone(), "main", "analytics");

        connector
            .load_snapshot_file(
                &TableName::new("sales", "users"),
                &columns(),
                "s3://bucket/etl/snapshot/sales.users.000000000.csv",
            )
            .await
            .unwrap();

        assert_eq!(
            executor.statements().await,
            vec![
                "COPY INTO `main`.`analytics`.`users` FROM (SELECT CAST(_c0 AS INT) AS `id`, CAST(_c1 AS STRING) AS `name` FROM 's3://bucket/etl/snapshot/sales.users.000000000.csv') FILEFORMAT = CSV FORMAT_OPTIONS ('header' = 'false', 'nullValue' = '\\\\N') COPY_OPTIONS ('force' = 'true')".to_owned()
            ]
        );
    }

    #[tokio::test]
    async fn merges_change_logs_read_with_read_files() {
        let executor = RecordingExecutor::default();
        let connector = DatabricksConnector::new(executor.clone(), "main", "analytics");
        let definition = TableDefinition::new(&TableName::new("sales", "users"), 3, columns());

        connector
            .load_increment_file(&definition, "s3://bucket/etl/increment/a.csv", "UTC")
            .await
            .unwrap();

        let statements = executor.statements().await;
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("MERGE INTO `main`.`analytics`.`users` AS T USING ("));
        assert!(statements[0].contains(
            "FROM read_files('s3://bucket/etl/increment/a.csv', format => 'csv', header => false, schema => '`etl_flag` STRING, `etl_tablename` STRING, `etl_schemaname` STRING, `etl_commit_ts` BIGINT, `id` INT, `name` STRING', timeZone => 'UTC', nullValue => '\\\\N')"
        ));
    }
}
