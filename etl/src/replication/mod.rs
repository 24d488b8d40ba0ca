//! Replication drivers run by the orchestrator's load stages.
//!
//! - [`snapshot`] loads the dumped snapshot files into a freshly created destination table.
//! - [`increment`] follows the change log, applying schema changes and data files in commit
//!   order while persisting its progress.

pub mod increment;
pub mod snapshot;
