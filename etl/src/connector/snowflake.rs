use tidb::types::{TableColumn, TableDefinition, TableName};
use tracing::debug;
use uuid::Uuid;

use crate::bail;
use crate::connector::{Connector, SqlExecutor, staging_table_name};
use crate::dialect::snowflake::SnowflakeDialect;
use crate::dialect::{Dialect, TargetTable, render_change_log_columns, render_merge};
use crate::error::{ErrorKind, EtlResult};
use crate::storage::StorageUri;

/// Loads into Snowflake through an external stage created over the storage root.
///
/// File URIs are translated into paths relative to the stage, so the stage must point at the
/// storage root itself.
#[derive(Debug)]
pub struct SnowflakeConnector<E> {
    executor: E,
    database: String,
    schema: String,
    stage: String,
    storage_root: StorageUri,
    dialect: SnowflakeDialect,
}

impl<E> SnowflakeConnector<E> {
    pub fn new(
        executor: E,
        database: impl Into<String>,
        schema: impl Into<String>,
        stage: impl Into<String>,
        storage_root: StorageUri,
    ) -> Self {
        Self {
            executor,
            database: database.into(),
            schema: schema.into(),
            stage: stage.into(),
            storage_root,
            dialect: SnowflakeDialect,
        }
    }

    fn copy_into(&self, relation: &str, file_uri: &str) -> EtlResult<String> {
        let Some(path) = self.storage_root.relative_path(file_uri) else {
            bail!(
                ErrorKind::InvalidData,
                "File is outside of the stage root",
                format!("{file_uri} is not below {}", self.storage_root)
            );
        };

        Ok(format!(
            "COPY INTO {relation} FROM @{}/{path} FILE_FORMAT = (TYPE = CSV FIELD_OPTIONALLY_ENCLOSED_BY = '\"' NULL_IF = ({})) FORCE = TRUE",
            self.stage,
            self.dialect.quote_literal("\\N")
        ))
    }
}

impl<E: SqlExecutor> Connector for SnowflakeConnector<E> {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn target_table(&self, table: &TableName) -> TargetTable {
        TargetTable::new([&self.database, &self.schema], &table.name)
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
        let target = self.target_table(table).qualified(&self.dialect);
        let statement = self.copy_into(&target, file_uri)?;
        debug!(%table, file_uri, "copying snapshot file into snowflake");

        self.executor.execute(&[statement]).await
    }

    async fn load_increment_file(
        &self,
        definition: &TableDefinition,
        file_uri: &str,
        timezone: &str,
    ) -> EtlResult<()> {
        let target = self.target_table(&definition.table_name());
        let staging = target
            .sibling(staging_table_name(Uuid::new_v4()))
            .qualified(&self.dialect);
        let columns = render_change_log_columns(&self.dialect, &definition.columns)?;

        let statements = vec![
            format!(
                "ALTER SESSION SET TIMEZONE = {}",
                self.dialect.quote_literal(timezone)
            ),
            format!(
                "CREATE TEMPORARY TABLE {staging} ({})",
                columns.join(", ")
            ),
            self.copy_into(&staging, file_uri)?,
            render_merge(
                &self.dialect,
                &target.qualified(&self.dialect),
                &staging,
                &definition.columns,
            )?,
            format!("DROP TABLE IF EXISTS {staging}"),
        ];

        self.executor.execute(&statements).await
    }
}
