use std::future::Future;
use std::time::Duration;

use tidb::types::{TableColumn, TableDefinition, TableName};

use crate::concurrency::shutdown::ShutdownRx;
use crate::dialect::{Dialect, TargetTable, render_create_table};
use crate::error::EtlResult;
use crate::replication::increment::IncrementReplicator;
use crate::replication::snapshot::replicate_snapshot;
use crate::source::SourceDatabase;
use crate::state::markers::SnapshotLoadInfo;
use crate::storage::ExternalStorage;

/// Runs SQL statements against a warehouse.
///
/// Statements of one call run in order, within one session where the warehouse supports it, so
/// session settings and temporary tables are visible to the statements that follow them.
pub trait SqlExecutor: Send + Sync {
    fn execute(&self, statements: &[String]) -> impl Future<Output = EtlResult<()>> + Send;
}

/// A warehouse that replicated data is loaded into.
///
/// A connector pairs a [`Dialect`] with a way to execute SQL and knows how to turn files in the
/// storage root into loads. The replication drivers only talk to this trait, which is what
/// [`Connector::load_snapshot`] and [`Connector::load_increment`] expose to the orchestrator.
pub trait Connector: Send + Sync {
    /// Returns the name of the connector.
    fn name(&self) -> &'static str;

    fn dialect(&self) -> &dyn Dialect;

    /// Returns the destination table replicating the source `table`.
    fn target_table(&self, table: &TableName) -> TargetTable;

    /// Executes DDL statements in order.
    fn execute_ddl(&self, statements: &[String]) -> impl Future<Output = EtlResult<()>> + Send;

    /// Creates the destination table of `table`, replacing an existing one when `replace` is set.
    fn create_table(
        &self,
        table: &TableName,
        columns: &[TableColumn],
        replace: bool,
    ) -> impl Future<Output = EtlResult<()>> + Send {
        async move {
            let statement =
                render_create_table(self.dialect(), &self.target_table(table), columns, replace)?;
            self.execute_ddl(&[statement]).await
        }
    }

    /// Appends one headerless snapshot CSV file to the destination table.
    fn load_snapshot_file(
        &self,
        table: &TableName,
        columns: &[TableColumn],
        file_uri: &str,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Applies one change-log file to the destination table described by `definition`.
    ///
    /// Time values without a zone in the file are interpreted in `timezone`.
    fn load_increment_file(
        &self,
        definition: &TableDefinition,
        file_uri: &str,
        timezone: &str,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Loads the dumped snapshot of `table` and records it in `snapshot/loadinfo`.
    fn load_snapshot<D, S>(
        &self,
        source: &D,
        storage: &S,
        table: &TableName,
    ) -> impl Future<Output = EtlResult<SnapshotLoadInfo>> + Send
    where
        Self: Sized,
        D: SourceDatabase,
        S: ExternalStorage,
    {
        replicate_snapshot(self, source, storage, table)
    }

    /// Applies the change log of `table` until shutdown is requested or the table is dropped.
    fn load_increment<S>(
        &self,
        storage: &S,
        table: &TableName,
        timezone: &str,
        poll_interval: Duration,
        shutdown_rx: ShutdownRx,
    ) -> impl Future<Output = EtlResult<()>> + Send
    where
        Self: Sized,
        S: ExternalStorage,
    {
        async move {
            IncrementReplicator::new(self, storage, table.clone(), timezone, poll_interval)
                .run(shutdown_rx)
                .await
        }
    }
}
