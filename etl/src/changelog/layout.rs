use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tidb::types::TableName;

use crate::storage::INCREMENT_DIR;

/// Data file of the change log, e.g. `<version>/2024-01-01/CDC000003.csv`.
///
/// Ordering follows application order: table version, sub-directory, then index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataFile {
    pub table_version: u64,
    /// Partition or date sub-directory, empty when files sit directly below the version.
    pub partition: String,
    pub index: u64,
    /// Path relative to the storage root.
    pub path: String,
}

/// Change-log files of one table, grouped by table version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLayout {
    /// Schema file per table version.
    pub schema_files: BTreeMap<u64, String>,
    /// Data files per table version, sorted.
    pub data_files: BTreeMap<u64, Vec<DataFile>>,
}

impl TableLayout {
    /// Returns every table version with a schema file, ascending.
    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.schema_files.keys().copied()
    }

    pub fn data_files(&self, table_version: u64) -> &[DataFile] {
        self.data_files
            .get(&table_version)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Returns the directory holding the change log of `table`, with a trailing slash.
pub fn table_prefix(table: &TableName) -> String {
    format!("{INCREMENT_DIR}/{}/{}/", table.schema, table.name)
}

/// Groups the listed paths of a table directory into schema and data files.
///
/// Paths outside the table directory and unrecognized names, such as `CDC.index`, are skipped.
pub fn parse_layout(table: &TableName, paths: &[String]) -> TableLayout {
    let prefix = table_prefix(table);
    let mut layout = TableLayout::default();

    for path in paths {
        let Some(relative) = path.strip_prefix(&prefix) else {
            continue;
        };

        if let Some(table_version) = parse_schema_file(relative) {
            layout.schema_files.insert(table_version, path.clone());
        } else if let Some((table_version, partition, index)) = parse_data_file(relative) {
            layout
                .data_files
                .entry(table_version)
                .or_default()
                .push(DataFile {
                    table_version,
                    partition,
                    index,
                    path: path.clone(),
                });
        }
    }

    for files in layout.data_files.values_mut() {
        files.sort();
    }

    layout
}

/// Parses `meta/schema_<version>_<checksum>.json`.
fn parse_schema_file(relative: &str) -> Option<u64> {
    let name = relative.strip_prefix("meta/")?;
    let stem = name.strip_prefix("schema_")?.strip_suffix(".json")?;
    let (table_version, checksum) = stem.split_once('_')?;
    if checksum.is_empty() {
        return None;
    }

    table_version.parse().ok()
}

/// Parses `<version>/[<partition>/]CDC<index>.csv`.
fn parse_data_file(relative: &str) -> Option<(u64, String, u64)> {
    let parts: Vec<&str> = relative.split('/').collect();
    let (first, rest) = parts.split_first()?;
    let (name, partition) = rest.split_last()?;
    if partition.len() > 1 {
        return None;
    }

    let table_version = first.parse().ok()?;
    let index = name.strip_prefix("CDC")?.strip_suffix(".csv")?;
    if index.is_empty() || !index.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    Some((
        table_version,
        partition.first().map(|part| (*part).to_owned()).unwrap_or_default(),
        index.parse().ok()?,
    ))
}
