use std::sync::Arc;
use std::time::Duration;

use config::shared::{
    CaptureConfig, ReplicatorConfig, RunMode, SnapshotConfig, StorageCredentials,
};
use tidb::types::TableName;
use tracing::{info, warn};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::connector::Connector;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::failpoints::{AFTER_CHANGEFEED_CREATED, etl_fail_point};
use crate::source::{
    ChangefeedRequest, ChangefeedStatus, DumpProgress, DumpRequest, StartPosition, Upstream,
};
use crate::state::markers::determine_stage;
use crate::state::stage::{Stage, StageAction, plan, stage_table};
use crate::storage::{ExternalStorage, StorageUri};

/// Lower bound of the incremental polling interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Returns how often the change log is polled: five times per capture flush, at most once a
/// second.
pub fn poll_interval(flush_interval: Duration) -> Duration {
    (flush_interval / 5).max(MIN_POLL_INTERVAL)
}

/// Everything one run of the pipeline decided before executing its first action.
#[derive(Debug, Clone)]
pub struct ReplicationContext {
    pub table: TableName,
    pub mode: RunMode,
    /// Stage derived from the progress markers at start.
    pub stage: Stage,
    pub storage_uri: StorageUri,
    pub snapshot_uri: StorageUri,
    pub increment_uri: StorageUri,
    pub start: StartPosition,
    pub capture: CaptureConfig,
    pub snapshot: SnapshotConfig,
    pub credentials: Option<StorageCredentials>,
    pub timezone: String,
}

/// Drives one table from wherever its progress markers say it is to continuous incremental
/// replication.
///
/// Every run re-derives the stage from storage, so a restarted process replays the remaining
/// actions of its mode and skips those whose marker already exists.
#[derive(Debug)]
pub struct Pipeline<S, C, U> {
    config: Arc<ReplicatorConfig>,
    storage: S,
    connector: C,
    upstream: U,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<S, C, U> Pipeline<S, C, U>
where
    S: ExternalStorage,
    C: Connector,
    U: Upstream,
{
    pub fn new(config: ReplicatorConfig, storage: S, connector: C, upstream: U) -> Self {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            storage,
            connector,
            upstream,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Runs every remaining action of the configured mode.
    ///
    /// Returns once the last action finished. With incremental loading enabled that only happens
    /// after shutdown was requested or the source table was dropped.
    pub async fn run(&self) -> EtlResult<ReplicationContext> {
        let table: TableName = self.config.table.parse().map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Invalid table name",
                self.config.table.clone(),
                source: err
            )
        })?;
        let mode = self.config.mode;

        let stage = determine_stage(&self.storage).await?;
        info!(%table, %stage, %mode, connector = self.connector.name(), "starting replication");

        for action in stage_table(stage, mode) {
            if action.enabled {
                info!(stage = %action.stage, action = %action.action, "action planned");
            } else {
                info!(stage = %action.stage, action = %action.action, %mode, "action skipped by run mode");
            }
        }
        let actions = plan(stage, mode);

        let start = self.start_position(&table, mode, &actions).await?;
        let storage_uri = self.storage.uri().clone();
        let context = ReplicationContext {
            table,
            mode,
            stage,
            snapshot_uri: storage_uri.snapshot()?,
            increment_uri: storage_uri.increment()?,
            storage_uri,
            start,
            capture: self.config.capture.clone(),
            snapshot: self.config.snapshot.clone(),
            credentials: self.config.storage.credentials.clone(),
            timezone: self.config.timezone.clone(),
        };

        for action in actions {
            info!(table = %context.table, %action, "executing action");
            self.execute(&context, action).await?;
        }

        info!(table = %context.table, "replication finished");

        Ok(context)
    }

    /// Acquires a fresh position when this run creates the changefeed or dumps the snapshot in
    /// full mode, so both start from the same point.
    async fn start_position(
        &self,
        table: &TableName,
        mode: RunMode,
        actions: &[StageAction],
    ) -> EtlResult<StartPosition> {
        let needs_position = actions.iter().any(|action| {
            matches!(
                action,
                StageAction::CreateChangefeed | StageAction::DumpSnapshot
            )
        });
        if mode != RunMode::Full || !needs_position {
            return Ok(StartPosition::Current);
        }

        let tso = self.upstream.current_position().await.map_err(|err| {
            err.wrap(
                ErrorKind::PositionAcquisitionFailed,
                "Failed to acquire the start position",
            )
        })?;
        info!(%table, tso, "acquired start position");

        Ok(StartPosition::Tso(tso))
    }

    async fn execute(&self, context: &ReplicationContext, action: StageAction) -> EtlResult<()> {
        match action {
            StageAction::CreateChangefeed => {
                let request = ChangefeedRequest {
                    table: context.table.clone(),
                    start: context.start,
                    sink_uri: context.increment_uri.clone(),
                    flush_interval: context.capture.flush_interval(),
                    file_size_bytes: context.capture.file_size_bytes,
                    credentials: context.credentials.clone(),
                };
                let status = self
                    .upstream
                    .create_changefeed(&request)
                    .await
                    .map_err(|err| {
                        err.wrap(ErrorKind::CaptureSetupFailed, "Failed to set up change capture")
                    })?;
                if status == ChangefeedStatus::AlreadyExists {
                    warn!(table = %context.table, "changefeed already existed, reusing it");
                }

                etl_fail_point(AFTER_CHANGEFEED_CREATED)?;
            }
            StageAction::DumpSnapshot => {
                let request = DumpRequest {
                    table: context.table.clone(),
                    start: context.start,
                    output_uri: context.snapshot_uri.clone(),
                    credentials: context.credentials.clone(),
                };
                let progress = |progress: DumpProgress| {
                    info!(
                        dumped_rows = progress.dumped_rows,
                        estimated_total_rows = progress.estimated_total_rows,
                        "snapshot dump progress"
                    );
                };
                self.upstream
                    .dump(&request, &progress)
                    .await
                    .map_err(|err| err.wrap(ErrorKind::SnapshotDumpFailed, "Snapshot dump failed"))?;
            }
            StageAction::LoadSnapshot => {
                let load_info = self
                    .connector
                    .load_snapshot(&self.upstream, &self.storage, &context.table)
                    .await
                    .map_err(|err| err.wrap(ErrorKind::SnapshotLoadFailed, "Snapshot load failed"))?;
                info!(table = %context.table, files = load_info.files.len(), "snapshot loaded");
            }
            StageAction::LoadIncrement => {
                self.connector
                    .load_increment(
                        &self.storage,
                        &context.table,
                        &context.timezone,
                        poll_interval(context.capture.flush_interval()),
                        self.shutdown_rx.clone(),
                    )
                    .await
                    .map_err(|err| {
                        err.wrap(ErrorKind::IncrementLoadFailed, "Incremental load failed")
                    })?;
            }
        }

        Ok(())
    }
}
