use std::sync::Arc;

use tidb::types::{ChangeType, TableColumn, TableName};
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::source::{
    ChangefeedRequest, ChangefeedService, ChangefeedStatus, DumpProgress, DumpRequest,
    SnapshotDumper, SourceDatabase,
};
use crate::state::markers::SNAPSHOT_METADATA;
use crate::storage::memory::MemoryStorage;
use crate::test_utils::fixtures::{write_checkpoint, write_schema_file, write_snapshot_file};

/// Commit timestamp of the table's initial schema version in the fake change log.
pub const TABLE_CREATED_TS: u64 = 100;

/// First position handed out by [`FakeSource::current_position`].
pub const FIRST_POSITION: u64 = 1_000;

#[derive(Debug)]
struct SourceState {
    next_position: u64,
    position_requests: usize,
    fail_position: bool,
}

/// Source database with a fixed table definition and a monotonic position counter.
#[derive(Debug, Clone)]
pub struct FakeSource {
    columns: Vec<TableColumn>,
    state: Arc<Mutex<SourceState>>,
}

impl FakeSource {
    pub fn new(columns: Vec<TableColumn>) -> Self {
        Self {
            columns,
            state: Arc::new(Mutex::new(SourceState {
                next_position: FIRST_POSITION,
                position_requests: 0,
                fail_position: false,
            })),
        }
    }

    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    /// Returns how often a position was requested.
    pub async fn position_requests(&self) -> usize {
        self.state.lock().await.position_requests
    }

    /// Makes position requests fail.
    pub async fn fail_position(&self, fail: bool) {
        self.state.lock().await.fail_position = fail;
    }
}

impl SourceDatabase for FakeSource {
    async fn current_position(&self) -> EtlResult<u64> {
        let mut state = self.state.lock().await;
        state.position_requests += 1;
        if state.fail_position {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Source database is unreachable"
            );
        }

        let position = state.next_position;
        state.next_position += 1;

        Ok(position)
    }

    async fn table_columns(&self, table: &TableName) -> EtlResult<Vec<TableColumn>> {
        if self.columns.is_empty() {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Source table does not exist",
                table
            );
        }

        Ok(self.columns.clone())
    }
}

#[derive(Debug, Default)]
struct UpstreamState {
    changefeeds: Vec<ChangefeedRequest>,
    dumps: Vec<DumpRequest>,
    snapshot_rows: Vec<Vec<Option<String>>>,
    fail_changefeed: bool,
    fail_dump: bool,
}

/// Upstream whose changefeed and dumper write into a [`MemoryStorage`] what the real services
/// write into the storage root.
///
/// Creating the changefeed writes the initial schema file at [`TABLE_CREATED_TS`] and a first
/// checkpoint at the start position. Dumping writes one snapshot data file with the configured
/// rows followed by `snapshot/metadata`. A second changefeed creation reports that it exists.
#[derive(Debug, Clone)]
pub struct FakeUpstream {
    source: FakeSource,
    storage: MemoryStorage,
    state: Arc<Mutex<UpstreamState>>,
}

impl FakeUpstream {
    pub fn new(columns: Vec<TableColumn>, storage: MemoryStorage) -> Self {
        Self {
            source: FakeSource::new(columns),
            storage,
            state: Arc::new(Mutex::new(UpstreamState::default())),
        }
    }

    pub fn source(&self) -> &FakeSource {
        &self.source
    }

    /// Sets the rows the next dumps produce.
    pub async fn set_snapshot_rows(&self, rows: &[&[Option<&str>]]) {
        self.state.lock().await.snapshot_rows = rows
            .iter()
            .map(|row| row.iter().map(|value| value.map(str::to_owned)).collect())
            .collect();
    }

    pub async fn changefeeds(&self) -> Vec<ChangefeedRequest> {
        self.state.lock().await.changefeeds.clone()
    }

    pub async fn dumps(&self) -> Vec<DumpRequest> {
        self.state.lock().await.dumps.clone()
    }

    pub async fn fail_changefeed(&self, fail: bool) {
        self.state.lock().await.fail_changefeed = fail;
    }

    pub async fn fail_dump(&self, fail: bool) {
        self.state.lock().await.fail_dump = fail;
    }
}

impl SourceDatabase for FakeUpstream {
    async fn current_position(&self) -> EtlResult<u64> {
        self.source.current_position().await
    }

    async fn table_columns(&self, table: &TableName) -> EtlResult<Vec<TableColumn>> {
        self.source.table_columns(table).await
    }
}

impl ChangefeedService for FakeUpstream {
    async fn create_changefeed(&self, request: &ChangefeedRequest) -> EtlResult<ChangefeedStatus> {
        let mut state = self.state.lock().await;
        if state.fail_changefeed {
            bail!(
                ErrorKind::CaptureSetupFailed,
                "Change-capture service rejected the changefeed",
                request.table
            );
        }

        let exists = state
            .changefeeds
            .iter()
            .any(|existing| existing.table == request.table);
        state.changefeeds.push(request.clone());
        if exists {
            return Ok(ChangefeedStatus::AlreadyExists);
        }

        write_schema_file(
            &self.storage,
            &request.table,
            TABLE_CREATED_TS,
            self.source.columns(),
            ChangeType::None,
        )
        .await;
        write_checkpoint(
            &self.storage,
            request.start.tso().unwrap_or(TABLE_CREATED_TS),
        )
        .await;
        info!(table = %request.table, start = %request.start, "fake changefeed created");

        Ok(ChangefeedStatus::Created)
    }
}

impl SnapshotDumper for FakeUpstream {
    async fn dump(
        &self,
        request: &DumpRequest,
        progress: &(dyn Fn(DumpProgress) + Send + Sync),
    ) -> EtlResult<()> {
        let mut state = self.state.lock().await;
        state.dumps.push(request.clone());
        if state.fail_dump {
            bail!(
                ErrorKind::SnapshotDumpFailed,
                "Dump tool exited with an error",
                "exit status: 1"
            );
        }

        let rows: Vec<Vec<Option<&str>>> = state
            .snapshot_rows
            .iter()
            .map(|row| row.iter().map(Option::as_deref).collect())
            .collect();
        let rows: Vec<&[Option<&str>]> = rows.iter().map(Vec::as_slice).collect();
        write_snapshot_file(&self.storage, &request.table, 0, &rows).await;

        let dumped_rows = rows.len() as u64;
        progress(DumpProgress {
            dumped_rows,
            estimated_total_rows: dumped_rows,
        });

        let start = request.start.tso().unwrap_or_default();
        self.storage
            .put(
                SNAPSHOT_METADATA,
                format!("Started dump at: -\nSHOW MASTER STATUS:\n\tPos: {start}\n"),
            )
            .await;

        Ok(())
    }
}
