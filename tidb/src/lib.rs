//! TiDB source model shared by the replication crates.
//!
//! The column and table definitions mirror the JSON schema files that TiCDC writes next to the
//! change log, so the same types describe both the live source table and each captured schema
//! version. Database access goes through [`sqlx`] and is enabled with the `sqlx` feature.

#[cfg(feature = "sqlx")]
pub mod db;
pub mod types;
