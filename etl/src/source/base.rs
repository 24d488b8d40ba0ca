use std::fmt;
use std::future::Future;
use std::time::Duration;

use config::shared::StorageCredentials;
use tidb::types::{TableColumn, TableName};

use crate::error::EtlResult;
use crate::storage::StorageUri;

/// Position replication starts from: a TSO acquired for this run or the cluster's current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Let the collaborator pick the current position when it starts.
    Current,
    Tso(u64),
}

impl StartPosition {
    pub fn tso(&self) -> Option<u64> {
        match self {
            StartPosition::Current => None,
            StartPosition::Tso(tso) => Some(*tso),
        }
    }
}

impl fmt::Display for StartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPosition::Current => f.write_str("current"),
            StartPosition::Tso(tso) => write!(f, "{tso}"),
        }
    }
}

/// Metadata queries against the source cluster.
pub trait SourceDatabase: Send + Sync {
    /// Returns a fresh consistency point of the cluster.
    fn current_position(&self) -> impl Future<Output = EtlResult<u64>> + Send;

    /// Returns the columns of `table` in ordinal order.
    fn table_columns(
        &self,
        table: &TableName,
    ) -> impl Future<Output = EtlResult<Vec<TableColumn>>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangefeedStatus {
    Created,
    AlreadyExists,
}

/// Everything needed to start capturing the changes of one table into the increment root.
#[derive(Debug, Clone)]
pub struct ChangefeedRequest {
    pub table: TableName,
    pub start: StartPosition,
    /// Increment root the change log is written to.
    pub sink_uri: StorageUri,
    pub flush_interval: Duration,
    pub file_size_bytes: u64,
    pub credentials: Option<StorageCredentials>,
}

/// The change-capture service.
pub trait ChangefeedService: Send + Sync {
    /// Creates the changefeed of the request unless it already exists.
    fn create_changefeed(
        &self,
        request: &ChangefeedRequest,
    ) -> impl Future<Output = EtlResult<ChangefeedStatus>> + Send;
}

/// Everything needed to dump a consistent snapshot of one table into the snapshot root.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    pub table: TableName,
    pub start: StartPosition,
    pub output_uri: StorageUri,
    pub credentials: Option<StorageCredentials>,
}

/// Row counters reported by the dump tool while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpProgress {
    pub dumped_rows: u64,
    pub estimated_total_rows: u64,
}

/// The snapshot dump tool.
pub trait SnapshotDumper: Send + Sync {
    /// Dumps the table and returns once the dump, including its `metadata` file, is complete.
    fn dump(
        &self,
        request: &DumpRequest,
        progress: &(dyn Fn(DumpProgress) + Send + Sync),
    ) -> impl Future<Output = EtlResult<()>> + Send;
}
