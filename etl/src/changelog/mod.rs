//! The change log written by the capture service: file layout, row format and the reference
//! semantics of applying a batch.

pub mod layout;
mod resolve;
mod row;

pub use resolve::{ResolvedChange, resolve_batch};
pub use row::{ChangeFlag, ChangeLogRow, parse_change_log, split_csv_line};

/// Operation flag of a change-log row.
pub const FLAG_COLUMN: &str = "etl_flag";
pub const TABLE_NAME_COLUMN: &str = "etl_tablename";
pub const SCHEMA_NAME_COLUMN: &str = "etl_schemaname";
/// Commit timestamp of a change-log row; orders changes of the same key.
pub const COMMIT_TS_COLUMN: &str = "etl_commit_ts";

/// Metadata columns in the order they precede the table columns in every row.
pub const META_COLUMNS: [&str; 4] = [
    FLAG_COLUMN,
    TABLE_NAME_COLUMN,
    SCHEMA_NAME_COLUMN,
    COMMIT_TS_COLUMN,
];

/// Flag value marking a delete.
pub const DELETE_FLAG: &str = "D";
