//! Warehouse connectors: how snapshot files and change-log files become loads and merges.

mod base;
pub mod bigquery;
pub mod databricks;
pub mod snowflake;

pub use base::{Connector, SqlExecutor};

use uuid::Uuid;

/// Prefix of the staging tables holding one change-log file during a merge.
const STAGING_TABLE_PREFIX: &str = "_etl_stage_";

pub(crate) fn staging_table_name(id: Uuid) -> String {
    format!("{STAGING_TABLE_PREFIX}{}", id.simple())
}
