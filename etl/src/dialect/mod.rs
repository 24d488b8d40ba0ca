//! SQL rendering per destination dialect: column types, DDL and the dedup merge.

mod base;
pub mod bigquery;
pub mod databricks;
mod ddl;
mod merge;
pub mod snowflake;

pub use base::{Dialect, TargetTable};
pub use ddl::{render_change_log_columns, render_create_table, render_ddl};
pub use merge::render_merge;
