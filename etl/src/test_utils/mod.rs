//! Testing utilities for replication runs without a TiDB cluster or a warehouse.
//!
//! Tests pair a [`crate::storage::memory::MemoryStorage`] with the doubles of this module:
//!
//! - [`connector`] provides a warehouse that applies loads and merges to in-memory tables and an
//!   executor that records the SQL a real connector would send.
//! - [`source`] provides an upstream whose changefeed and dumper write the same files and
//!   markers the real services write.
//! - [`fixtures`] writes schema files, change-log files, snapshot files and checkpoints.
//! - [`failpoints`] arms failpoints for crash and resume tests.
//! - [`notify`] waits for asynchronous progress with a timeout.
//! - [`pipeline`] wires the doubles into a pipeline.

pub mod connector;
pub mod failpoints;
pub mod fixtures;
pub mod notify;
pub mod pipeline;
pub mod source;
