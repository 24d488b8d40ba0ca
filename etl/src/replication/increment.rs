use std::time::Duration;

use tidb::types::{TableDefinition, TableName};
use tracing::{debug, info, warn};

use crate::bail;
use crate::changelog::layout::{TableLayout, parse_layout, table_prefix};
use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested};
use crate::connector::Connector;
use crate::dialect::render_ddl;
use crate::error::{ErrorKind, EtlResult};
use crate::failpoints::{BEFORE_INCREMENT_PROGRESS_SAVED, etl_fail_point};
use crate::schema::diff::diff_columns;
use crate::state::markers::{
    IncrementLoadInfo, read_increment_checkpoint, read_increment_load_info,
    write_increment_load_info,
};
use crate::storage::ExternalStorage;

/// Result of one polling round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Everything durable was applied; poll again later.
    CaughtUp,
    /// The table or its schema was dropped; nothing more will arrive.
    TableDropped,
}

/// Applies the change log of one table as the capture service makes it durable.
///
/// Progress is persisted to `increment/loadinfo` after every DDL and every data file, so a
/// restart resumes right after the last applied unit.
pub struct IncrementReplicator<'a, C, S> {
    connector: &'a C,
    storage: &'a S,
    table: TableName,
    timezone: String,
    poll_interval: Duration,
    progress: IncrementLoadInfo,
}

impl<'a, C, S> IncrementReplicator<'a, C, S>
where
    C: Connector,
    S: ExternalStorage,
{
    pub fn new(
        connector: &'a C,
        storage: &'a S,
        table: TableName,
        timezone: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            connector,
            storage,
            table,
            timezone: timezone.into(),
            poll_interval,
            progress: IncrementLoadInfo::default(),
        }
    }

    /// Restores the persisted progress, if any.
    pub async fn resume(&mut self) -> EtlResult<()> {
        if let Some(progress) = read_increment_load_info(self.storage).await? {
            info!(
                table = %self.table,
                table_version = ?progress.table_version,
                last_file = ?progress.last_file.as_ref().map(|file| &file.path),
                "resuming incremental replication"
            );
            self.progress = progress;
        }

        Ok(())
    }

    pub fn progress(&self) -> &IncrementLoadInfo {
        &self.progress
    }

    /// Polls until shutdown is requested or the table is dropped.
    pub async fn run(mut self, mut shutdown_rx: ShutdownRx) -> EtlResult<()> {
        self.resume().await?;

        loop {
            if is_shutdown_requested(&shutdown_rx) {
                info!(table = %self.table, "shutdown requested, stopping incremental replication");
                return Ok(());
            }

            if self.poll_once().await? == PollOutcome::TableDropped {
                info!(table = %self.table, "table was dropped, stopping incremental replication");
                return Ok(());
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!(table = %self.table, "shutdown requested, stopping incremental replication");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Applies every table version and data file that is durable and not applied yet.
    pub async fn poll_once(&mut self) -> EtlResult<PollOutcome> {
        let Some(checkpoint) = read_increment_checkpoint(self.storage).await? else {
            debug!(table = %self.table, "no checkpoint written yet");
            return Ok(PollOutcome::CaughtUp);
        };
        debug!(table = %self.table, checkpoint, "observed capture checkpoint");

        let paths = self.storage.list_files(&table_prefix(&self.table)).await?;
        let layout = parse_layout(&self.table, &paths);

        let versions: Vec<u64> = layout
            .versions()
            .filter(|version| *version <= checkpoint)
            .collect();
        for version in versions {
            if self.apply_version(&layout, version).await? == PollOutcome::TableDropped {
                return Ok(PollOutcome::TableDropped);
            }
        }

        Ok(PollOutcome::CaughtUp)
    }

    async fn apply_version(&mut self, layout: &TableLayout, version: u64) -> EtlResult<PollOutcome> {
        let definition = match self.progress.table_version {
            Some(applied) if version < applied => return Ok(PollOutcome::CaughtUp),
            Some(applied) if version == applied => {
                TableDefinition::new(&self.table, version, self.progress.columns.clone())
            }
            Some(_) => {
                let definition = self.read_definition(layout, version).await?;
                if self.apply_schema_change(&definition).await? {
                    return Ok(PollOutcome::TableDropped);
                }
                definition
            }
            None => {
                let definition = self.read_definition(layout, version).await?;
                info!(table = %self.table, table_version = version, "established baseline table definition");
                self.connector
                    .create_table(&self.table, &definition.columns, false)
                    .await?;
                self.progress.table_version = Some(version);
                self.progress.columns = definition.columns.clone();
                self.save_progress().await?;
                definition
            }
        };

        for file in layout.data_files(version) {
            if self.progress.is_applied(file) {
                continue;
            }

            let file_uri = self.storage.uri().file_uri(&file.path);
            self.connector
                .load_increment_file(&definition, &file_uri, &self.timezone)
                .await?;
            info!(table = %self.table, file = %file.path, "applied change-log file");

            etl_fail_point(BEFORE_INCREMENT_PROGRESS_SAVED)?;
            self.progress.last_file = Some(file.clone());
            self.save_progress().await?;
        }

        Ok(PollOutcome::CaughtUp)
    }

    /// Applies the DDL leading to `definition`. Returns `true` when the table was dropped.
    async fn apply_schema_change(&mut self, definition: &TableDefinition) -> EtlResult<bool> {
        let diff = diff_columns(&self.progress.columns, definition)?;
        let target = self.connector.target_table(&self.table);
        let statements = render_ddl(self.connector.dialect(), &target, &diff)?;

        for statement in &statements {
            info!(table = %self.table, table_version = definition.table_version, statement = %statement, "applying ddl");
        }
        if !statements.is_empty() {
            self.connector.execute_ddl(&statements).await?;
        }

        self.progress.table_version = Some(definition.table_version);
        self.progress.columns = definition.columns.clone();
        self.save_progress().await?;

        if diff.drops_table() {
            warn!(table = %self.table, "source table was dropped");
            return Ok(true);
        }

        Ok(false)
    }

    async fn read_definition(&self, layout: &TableLayout, version: u64) -> EtlResult<TableDefinition> {
        let Some(path) = layout.schema_files.get(&version) else {
            bail!(
                ErrorKind::InvalidState,
                "Schema file of a table version is missing",
                format!("{} version {version}", self.table)
            );
        };
        let contents = self.storage.read_file(path).await?;

        Ok(serde_json::from_slice(&contents)?)
    }

    async fn save_progress(&self) -> EtlResult<()> {
        write_increment_load_info(self.storage, &self.progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageUri;
    use crate::storage::memory::MemoryStorage;
    use crate::connector::bigquery::BigQueryConnector;
    use crate::test_utils::connector::{MemoryConnector, RecordingExecutor};
    use crate::test_utils::fixtures::{
        change_row, orders_columns, orders_table, write_change_log, write_checkpoint,
        write_schema_file,
    };
    use crate::changelog::ChangeFlag::{Delete, Insert, Update};
    use tidb::types::{ChangeType, TableColumn};

    fn storage() -> MemoryStorage {
        MemoryStorage::new(StorageUri::parse("s3://bucket/etl").unwrap())
    }

    fn replicator<'a>(
        connector: &'a MemoryConnector,
        storage: &'a MemoryStorage,
    ) -> IncrementReplicator<'a, MemoryConnector, MemoryStorage> {
        IncrementReplicator::new(
            connector,
            storage,
            orders_table(),
            "UTC",
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn waits_for_the_first_checkpoint() {
        let storage = storage();
        write_schema_file(&storage, &orders_table(), 100, &orders_columns(), ChangeType::None).await;
        let connector = MemoryConnector::new(storage.clone());

        let outcome = replicator(&connector, &storage).poll_once().await.unwrap();

        assert_eq!(outcome, PollOutcome::CaughtUp);
        assert!(connector.increment_files().await.is_empty());
    }

    #[tokio::test]
    async fn applies_only_versions_covered_by_the_checkpoint() {
        let storage = storage();
        let table = orders_table();
        write_schema_file(&storage, &table, 100, &orders_columns(), ChangeType::None).await;
        write_change_log(&storage, &table, 100, 1, &[change_row(Insert, 101, &["1", "5.00", "new"])]).await;
        write_schema_file(&storage, &table, 200, &orders_columns(), ChangeType::Truncate).await;
        write_change_log(&storage, &table, 200, 1, &[change_row(Insert, 201, &["2", "1.00", "new"])]).await;
        write_checkpoint(&storage, 150).await;
        let connector = MemoryConnector::new(storage.clone());

        let mut replicator = replicator(&connector, &storage);
        replicator.poll_once().await.unwrap();

        assert_eq!(replicator.progress().table_version, Some(100));
        assert_eq!(
            connector.increment_files().await,
            vec!["increment/sales/orders/100/CDC000001.csv".to_owned()]
        );
        assert!(connector.ddl_batches().await.is_empty());

        write_checkpoint(&storage, 250).await;
        replicator.poll_once().await.unwrap();

        assert_eq!(replicator.progress().table_version, Some(200));
        assert_eq!(
            connector.ddl_batches().await,
            vec![vec!["TRUNCATE TABLE `memory`.`orders`".to_owned()]]
        );
        assert_eq!(connector.increment_files().await.len(), 2);
    }

    #[tokio::test]
    async fn resumes_after_the_last_applied_file() {
        let storage = storage();
        let table = orders_table();
        write_schema_file(&storage, &table, 100, &orders_columns(), ChangeType::None).await;
        write_change_log(&storage, &table, 100, 1, &[change_row(Insert, 101, &["1", "5.00", "new"])]).await;
        write_change_log(&storage, &table, 100, 2, &[change_row(Update, 102, &["1", "6.00", "paid"])]).await;
        write_checkpoint(&storage, 150).await;
        let connector = MemoryConnector::new(storage.clone());

        replicator(&connector, &storage).poll_once().await.unwrap();
        write_change_log(&storage, &table, 100, 3, &[change_row(Delete, 103, &["1", "6.00", "paid"])]).await;

        let mut resumed = replicator(&connector, &storage);
        resumed.resume().await.unwrap();
        resumed.poll_once().await.unwrap();

        assert_eq!(
            connector.increment_files().await,
            vec![
                "increment/sales/orders/100/CDC000001.csv".to_owned(),
                "increment/sales/orders/100/CDC000002.csv".to_owned(),
                "increment/sales/orders/100/CDC000003.csv".to_owned(),
            ]
        );
        assert_eq!(connector.row_count(&table).await, 0);
    }

    #[tokio::test]
    async fn renders_column_changes_between_versions() {
        let storage = storage();
        let table = orders_table();
        let mut altered = orders_columns();
        altered.push(TableColumn::new("note", "VARCHAR").with_id("4").with_precision(64));
        write_schema_file(&storage, &table, 100, &orders_columns(), ChangeType::None).await;
        write_schema_file(&storage, &table, 200, &altered, ChangeType::None).await;
        write_change_log(
            &storage,
            &table,
            200,
            1,
            &[change_row(Insert, 201, &["7", "1.00", "new", "hello"])],
        )
        .await;
        write_checkpoint(&storage, 300).await;
        let connector = MemoryConnector::new(storage.clone());

        replicator(&connector, &storage).poll_once().await.unwrap();

        assert_eq!(
            connector.ddl_batches().await,
            vec![vec!["ALTER TABLE `memory`.`orders` ADD COLUMN IF NOT EXISTS `note` STRING".to_owned()]]
        );
        assert_eq!(
            connector.row(&table, &["7"]).await.unwrap().get("note"),
            Some(&Some("hello".to_owned()))
        );
    }

    #[tokio::test]
    async fn stops_after_the_table_is_dropped() {
        let storage = storage();
        let table = orders_table();
        write_schema_file(&storage, &table, 100, &orders_columns(), ChangeType::None).await;
        write_schema_file(&storage, &table, 200, &[], ChangeType::DropTable).await;
        write_checkpoint(&storage, 300).await;
        let connector = MemoryConnector::new(storage.clone());

        let outcome = replicator(&connector, &storage).poll_once().await.unwrap();

        assert_eq!(outcome, PollOutcome::TableDropped);
        assert_eq!(
            connector.ddl_batches().await,
            vec![vec!["DROP TABLE IF EXISTS `memory`.`orders`".to_owned()]]
        );
    }

    #[tokio::test]
    async fn creates_the_destination_table_with_the_baseline() {
        let storage = storage();
        let table = orders_table();
        write_schema_file(&storage, &table, 100, &orders_columns(), ChangeType::None).await;
        write_change_log(&storage, &table, 100, 1, &[change_row(Insert, 101, &["1", "5.00", "new"])]).await;
        write_checkpoint(&storage, 150).await;
        let executor = RecordingExecutor::default();
        let connector = BigQueryConnector::new(executor.clone(), "proj", "analytics");

        IncrementReplicator::new(
            &connector,
            &storage,
            table,
            "UTC",
            Duration::from_millis(10),
        )
        .poll_once()
        .await
        .unwrap();

        let batches = executor.batches().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert!(batches[0][0].starts_with("CREATE TABLE IF NOT EXISTS `proj`.`analytics`.`orders` ("));
        assert!(batches[1][2].starts_with("MERGE INTO `proj`.`analytics`.`orders` AS T USING ("));
    }

    #[tokio::test]
    async fn change_log_without_a_destination_table_fails() {
        let storage = storage();
        let table = orders_table();
        write_change_log(&storage, &table, 100, 1, &[change_row(Insert, 101, &["1", "5.00", "new"])]).await;
        let connector = MemoryConnector::new(storage.clone());
        let definition = TableDefinition::new(&table, 100, orders_columns());

        let err = connector
            .load_increment_file(
                &definition,
                "s3://bucket/etl/increment/sales/orders/100/CDC000001.csv",
                "UTC",
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    }
}
