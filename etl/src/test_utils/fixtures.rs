use config::shared::{
    CaptureConfig, DestinationConfig, ReplicatorConfig, RunMode, SnapshotConfig, SourceConfig,
    StorageConfig,
};
use tidb::types::{ChangeType, TableColumn, TableDefinition, TableName};

use crate::changelog::layout::table_prefix;
use crate::changelog::{ChangeFlag, ChangeLogRow};
use crate::state::markers::{INCREMENT_METADATA, IncrementMetadata};
use crate::storage::memory::MemoryStorage;
use crate::storage::{SNAPSHOT_DIR, StorageUri};

pub fn orders_table() -> TableName {
    TableName::new("sales", "orders")
}

/// Columns of `sales.orders`: `id` (primary key), `amount` and `status`.
pub fn orders_columns() -> Vec<TableColumn> {
    vec![
        TableColumn::new("id", "BIGINT").with_id("1").primary_key(),
        TableColumn::new("amount", "DECIMAL")
            .with_id("2")
            .with_precision(10)
            .with_scale(2),
        TableColumn::new("status", "VARCHAR")
            .with_id("3")
            .with_precision(32),
    ]
}

/// Returns a storage root on a fictional bucket.
pub fn memory_storage() -> MemoryStorage {
    MemoryStorage::new(StorageUri::parse("s3://bucket/etl").expect("static storage uri is valid"))
}

fn csv_line(values: &[Option<&str>]) -> String {
    values
        .iter()
        .map(|value| match value {
            Some(value) => format!("\"{}\"", value.replace('"', "\"\"")),
            None => "\\N".to_owned(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Writes a headerless snapshot data file the way the dumper names it.
pub async fn write_snapshot_file(
    storage: &MemoryStorage,
    table: &TableName,
    index: u32,
    rows: &[&[Option<&str>]],
) {
    let path = format!(
        "{SNAPSHOT_DIR}/{}.{}.{index:09}.csv",
        table.schema, table.name
    );
    let contents: String = rows.iter().map(|row| csv_line(row) + "\n").collect();

    storage.put(&path, contents).await;
}

/// Writes the schema file of `table_version`, as the capture service does on every DDL.
pub async fn write_schema_file(
    storage: &MemoryStorage,
    table: &TableName,
    table_version: u64,
    columns: &[TableColumn],
    change_type: ChangeType,
) {
    let definition = TableDefinition::new(table, table_version, columns.to_vec())
        .with_change_type(change_type);
    let path = format!(
        "{}meta/schema_{table_version}_0000000000.json",
        table_prefix(table)
    );

    storage
        .put(
            &path,
            serde_json::to_vec(&definition).expect("table definition serializes"),
        )
        .await;
}

/// Returns a change-log row of `sales.orders`.
pub fn change_row(flag: ChangeFlag, commit_ts: u64, values: &[&str]) -> ChangeLogRow {
    ChangeLogRow {
        flag,
        table: "orders".to_owned(),
        schema: "sales".to_owned(),
        commit_ts,
        values: values.iter().map(|value| Some((*value).to_owned())).collect(),
    }
}

/// Writes change-log data file `index` of `table_version`.
pub async fn write_change_log(
    storage: &MemoryStorage,
    table: &TableName,
    table_version: u64,
    index: u64,
    rows: &[ChangeLogRow],
) {
    let path = format!(
        "{}{table_version}/CDC{index:06}.csv",
        table_prefix(table)
    );
    let contents: String = rows.iter().map(|row| row.to_csv_line() + "\n").collect();

    storage.put(&path, contents).await;
}

/// Advances the capture checkpoint.
pub async fn write_checkpoint(storage: &MemoryStorage, checkpoint_ts: u64) {
    let metadata = IncrementMetadata { checkpoint_ts };

    storage
        .put(
            INCREMENT_METADATA,
            serde_json::to_vec(&metadata).expect("checkpoint serializes"),
        )
        .await;
}

/// Returns a valid configuration replicating `sales.orders` in `mode`.
pub fn test_config(mode: RunMode) -> ReplicatorConfig {
    ReplicatorConfig {
        table: orders_table().to_string(),
        mode,
        timezone: "UTC".to_owned(),
        source: SourceConfig {
            host: "127.0.0.1".to_owned(),
            port: 4000,
            username: "root".to_owned(),
            password: None,
        },
        storage: StorageConfig {
            uri: "s3://bucket/etl".to_owned(),
            region: None,
            endpoint: None,
            credentials: None,
            service_account_key: None,
        },
        capture: CaptureConfig {
            host: "127.0.0.1".to_owned(),
            port: 8300,
            flush_interval_secs: 5,
            file_size_bytes: 64 * 1024 * 1024,
        },
        snapshot: SnapshotConfig::default(),
        destination: DestinationConfig::BigQuery {
            project_id: "project".to_owned(),
            dataset_id: "dataset".to_owned(),
            service_account_key: "{}".into(),
        },
    }
}
