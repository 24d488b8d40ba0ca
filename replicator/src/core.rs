use config::shared::{DestinationConfig, ReplicatorConfig};
use etl::clients::bigquery::BigQueryExecutor;
use etl::clients::databricks::DatabricksExecutor;
use etl::clients::snowflake::SnowflakeExecutor;
use etl::connector::Connector;
use etl::connector::bigquery::BigQueryConnector;
use etl::connector::databricks::DatabricksConnector;
use etl::connector::snowflake::SnowflakeConnector;
use etl::pipeline::Pipeline;
use etl::source::cdc::TiCdcClient;
use etl::source::database::TidbSource;
use etl::source::dump::DumplingRunner;
use etl::source::{TidbUpstream, Upstream};
use etl::storage::{ExternalStorage, StorageBackend};
use secrecy::ExposeSecret;
use std::sync::Once;
use tracing::{error, info, warn};

static INIT_CRYPTO: Once = Once::new();

/// Installs the process-wide rustls provider used by the BigQuery and GCS clients.
fn install_crypto_provider_once() {
    INIT_CRYPTO.call_once(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            warn!("a rustls crypto provider was already installed");
        }
    });
}

// Statically dispatches the pipeline over the concrete connector of each destination.
macro_rules! start_pipeline_dispatch {
    ($config:expr, $storage:expr, $connector:expr, $upstream:expr) => {{
        let pipeline = Pipeline::new($config, $storage, $connector, $upstream);
        start_pipeline(pipeline).await
    }};
}

pub async fn start_replicator(config: ReplicatorConfig) -> anyhow::Result<()> {
    info!(
        table = %config.table,
        mode = %config.mode,
        destination = config.destination.name(),
        "starting replicator"
    );

    install_crypto_provider_once();

    let storage = StorageBackend::open(&config.storage).await?;
    info!(storage = %storage.uri(), "opened storage root");

    let source = TidbSource::connect(&config.source).await?;
    let cdc = TiCdcClient::new(&config.capture.host, config.capture.port);
    let dumper = DumplingRunner::new(config.source.clone(), config.snapshot.clone());
    let upstream = TidbUpstream::new(source, cdc, dumper);

    match config.destination.clone() {
        DestinationConfig::BigQuery {
            project_id,
            dataset_id,
            service_account_key,
        } => {
            let executor = BigQueryExecutor::new_with_key(
                project_id.clone(),
                service_account_key.expose_secret(),
            )
            .await?;
            let connector = BigQueryConnector::new(executor, project_id, dataset_id);

            start_pipeline_dispatch!(config, storage, connector, upstream)?;
        }
        DestinationConfig::Databricks {
            host,
            token,
            catalog,
            schema,
            warehouse_id,
        } => {
            let executor = DatabricksExecutor::new(
                &host,
                token,
                warehouse_id,
                catalog.clone(),
                schema.clone(),
            );
            let connector = DatabricksConnector::new(executor, catalog, schema);

            start_pipeline_dispatch!(config, storage, connector, upstream)?;
        }
        DestinationConfig::Snowflake {
            account,
            token,
            database,
            schema,
            warehouse,
            role,
            stage,
        } => {
            let executor = SnowflakeExecutor::new(
                &account,
                token,
                database.clone(),
                schema.clone(),
                warehouse,
                role,
            );
            let storage_root = storage.uri().clone();
            let connector =
                SnowflakeConnector::new(executor, database, schema, stage, storage_root);

            start_pipeline_dispatch!(config, storage, connector, upstream)?;
        }
    }

    Ok(())
}

async fn start_pipeline<S, C, U>(pipeline: Pipeline<S, C, U>) -> anyhow::Result<()>
where
    S: ExternalStorage,
    C: Connector,
    U: Upstream,
{
    // Ctrl+C stops incremental replication after the file being applied.
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {err}");
            return;
        }

        info!("ctrl+c received, shutting down replication");
        if let Err(err) = shutdown_tx.shutdown() {
            warn!("failed to send shutdown signal: {err}");
        }
    });

    let result = pipeline.run().await;

    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    let context = result?;
    info!(
        table = %context.table,
        stage = %context.stage,
        start = %context.start,
        "replicator stopped"
    );

    Ok(())
}
