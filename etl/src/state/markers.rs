use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidb::types::TableColumn;
use tracing::{debug, warn};

use crate::changelog::layout::DataFile;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::state::stage::Stage;
use crate::storage::ExternalStorage;

/// Written by the change-capture service with every checkpoint.
pub const INCREMENT_METADATA: &str = "increment/metadata";
/// Written by the snapshot dumper once the dump completed.
pub const SNAPSHOT_METADATA: &str = "snapshot/metadata";
/// Written after the snapshot was loaded into the destination.
pub const SNAPSHOT_LOADINFO: &str = "snapshot/loadinfo";
/// Progress of the incremental replication.
pub const INCREMENT_LOADINFO: &str = "increment/loadinfo";

/// Markers in probing order, each with the stage it proves.
const STAGE_MARKERS: [(&str, Stage); 3] = [
    (INCREMENT_METADATA, Stage::ChangefeedCreated),
    (SNAPSHOT_METADATA, Stage::SnapshotDumped),
    (SNAPSHOT_LOADINFO, Stage::SnapshotLoaded),
];

/// Derives the current stage from the markers present in `storage`.
///
/// Markers are probed in order and the stage advances once per present marker, stopping at the
/// first absent one. A failed probe is an error, never an absent marker.
pub async fn determine_stage<S>(storage: &S) -> EtlResult<Stage>
where
    S: ExternalStorage,
{
    let mut stage = Stage::Init;
    let mut missing = None;
    for (index, (marker, marker_stage)) in STAGE_MARKERS.iter().enumerate() {
        let present = storage.file_exists(marker).await.map_err(|err| {
            etl_error!(
                ErrorKind::StorageCheckFailed,
                "Failed to check progress marker",
                format!("{}/{marker}", storage.uri()),
                source: err
            )
        })?;
        if !present {
            missing = Some(index);
            break;
        }

        stage = *marker_stage;
    }

    // Later markers never decide the stage, a failed probe here is ignored.
    if let Some(index) = missing {
        for (later, _) in STAGE_MARKERS.iter().skip(index + 1) {
            if let Ok(true) = storage.file_exists(later).await {
                warn!(
                    missing = %STAGE_MARKERS[index].0,
                    present = %later,
                    "progress markers are inconsistent, a later marker exists without an earlier one"
                );
                break;
            }
        }
    }

    debug!(%stage, uri = %storage.uri(), "derived replication stage");

    Ok(stage)
}

/// Content of the change-capture checkpoint file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementMetadata {
    /// Every change committed at or before this TSO has been flushed to storage.
    #[serde(rename = "checkpoint-ts")]
    pub checkpoint_ts: u64,
}

/// Reads the flushed checkpoint, or `None` when the capture service has not written one yet.
pub async fn read_increment_checkpoint<S>(storage: &S) -> EtlResult<Option<u64>>
where
    S: ExternalStorage,
{
    if !storage.file_exists(INCREMENT_METADATA).await? {
        return Ok(None);
    }

    let contents = storage.read_file(INCREMENT_METADATA).await?;
    let metadata: IncrementMetadata = serde_json::from_slice(&contents)?;

    Ok(Some(metadata.checkpoint_ts))
}

/// Content of [`SNAPSHOT_LOADINFO`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLoadInfo {
    pub table: String,
    pub files: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

pub async fn write_snapshot_load_info<S>(storage: &S, info: &SnapshotLoadInfo) -> EtlResult<()>
where
    S: ExternalStorage,
{
    let contents = serde_json::to_vec_pretty(info)?;
    storage
        .write_file(SNAPSHOT_LOADINFO, Bytes::from(contents))
        .await
}

/// Content of [`INCREMENT_LOADINFO`]: how far the change log has been applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementLoadInfo {
    /// Table version whose definition the destination currently has.
    pub table_version: Option<u64>,
    /// Last data file applied to the destination.
    pub last_file: Option<DataFile>,
    /// Columns of the applied table version.
    pub columns: Vec<TableColumn>,
}

impl IncrementLoadInfo {
    /// Returns `true` if `file` was applied already.
    pub fn is_applied(&self, file: &DataFile) -> bool {
        self.last_file.as_ref().is_some_and(|last| file <= last)
    }
}

pub async fn read_increment_load_info<S>(storage: &S) -> EtlResult<Option<IncrementLoadInfo>>
where
    S: ExternalStorage,
{
    if !storage.file_exists(INCREMENT_LOADINFO).await? {
        return Ok(None);
    }

    let contents = storage.read_file(INCREMENT_LOADINFO).await?;

    Ok(Some(serde_json::from_slice(&contents)?))
}

pub async fn write_increment_load_info<S>(storage: &S, info: &IncrementLoadInfo) -> EtlResult<()>
where
    S: ExternalStorage,
{
    let contents = serde_json::to_vec(info)?;
    storage
        .write_file(INCREMENT_LOADINFO, Bytes::from(contents))
        .await
}
