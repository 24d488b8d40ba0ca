//! Resumable replication of one TiDB table into a data warehouse.
//!
//! The change-capture service and the snapshot dumper write into a shared storage root. The
//! [`pipeline::Pipeline`] derives its progress from the markers found there, runs the remaining
//! stages of the configured run mode and hands the files to a [`connector::Connector`], which
//! turns them into loads, DDL and deduplicating merges for BigQuery, Databricks or Snowflake.

pub mod changelog;
pub mod clients;
pub mod concurrency;
pub mod connector;
pub mod dialect;
pub mod error;
pub mod failpoints;
mod macros;
pub mod pipeline;
pub mod replication;
pub mod schema;
pub mod source;
pub mod state;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
