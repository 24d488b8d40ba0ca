use chrono::Utc;
use tidb::types::TableName;
use tracing::info;

use crate::connector::Connector;
use crate::error::EtlResult;
use crate::failpoints::{BEFORE_SNAPSHOT_LOADINFO, etl_fail_point};
use crate::source::SourceDatabase;
use crate::state::markers::{SnapshotLoadInfo, write_snapshot_load_info};
use crate::storage::{ExternalStorage, SNAPSHOT_DIR};

/// Returns the data files Dumpling wrote for `table`, e.g. `snapshot/sales.orders.000000000.csv`,
/// in load order.
pub async fn snapshot_files<S>(storage: &S, table: &TableName) -> EtlResult<Vec<String>>
where
    S: ExternalStorage,
{
    let dir = format!("{SNAPSHOT_DIR}/");
    let file_prefix = format!("{}.{}.", table.schema, table.name);

    let mut files: Vec<String> = storage
        .list_files(&dir)
        .await?
        .into_iter()
        .filter(|path| {
            path.strip_prefix(&dir).is_some_and(|name| {
                !name.contains('/') && name.starts_with(&file_prefix) && name.ends_with(".csv")
            })
        })
        .collect();
    files.sort();

    Ok(files)
}

/// Loads the dumped snapshot of `table` into the destination and writes `snapshot/loadinfo`.
///
/// The destination table is recreated first, so running this again after a crash starts over
/// from an empty table instead of duplicating rows.
pub async fn replicate_snapshot<C, D, S>(
    connector: &C,
    source: &D,
    storage: &S,
    table: &TableName,
) -> EtlResult<SnapshotLoadInfo>
where
    C: Connector,
    D: SourceDatabase,
    S: ExternalStorage,
{
    let columns = source.table_columns(table).await?;
    connector.create_table(table, &columns, true).await?;

    let files = snapshot_files(storage, table).await?;
    info!(%table, file_count = files.len(), connector = connector.name(), "loading snapshot");

    for file in &files {
        let file_uri = storage.uri().file_uri(file);
        connector
            .load_snapshot_file(table, &columns, &file_uri)
            .await?;
        info!(%table, file = %file, "loaded snapshot file");
    }

    etl_fail_point(BEFORE_SNAPSHOT_LOADINFO)?;

    let load_info = SnapshotLoadInfo {
        table: table.to_string(),
        files,
        loaded_at: Utc::now(),
    };
    write_snapshot_load_info(storage, &load_info).await?;

    Ok(load_info)
}
