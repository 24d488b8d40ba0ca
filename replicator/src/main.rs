//! Replicator binary.
//!
//! Replicates the one TiDB table named in its configuration into BigQuery, Databricks or
//! Snowflake, resuming from the progress markers of its storage root on every start.

use telemetry::init_tracing;
use tracing::error;

use crate::config::load_replicator_config;
use crate::core::start_replicator;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    let replicator_config = load_replicator_config()?;

    let _log_flusher = init_tracing(
        env!("CARGO_BIN_NAME"),
        Some(replicator_config.table.clone()),
    )?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            if let Err(err) = start_replicator(replicator_config).await {
                error!("{err:#}");
                return Err(err);
            }

            Ok(())
        })
}
