use config::shared::SourceConfig;
use sqlx::MySqlPool;
use tidb::db::{connect_to_source_database, get_current_tso, get_table_columns};
use tidb::types::{TableColumn, TableName};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::SourceDatabase;

/// Metadata queries only need a couple of connections.
const MAX_CONNECTIONS: u32 = 2;

/// [`SourceDatabase`] backed by a TiDB cluster.
#[derive(Debug, Clone)]
pub struct TidbSource {
    pool: MySqlPool,
}

impl TidbSource {
    pub async fn connect(config: &SourceConfig) -> EtlResult<TidbSource> {
        let pool = connect_to_source_database(config, MAX_CONNECTIONS)
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::SourceConnectionFailed,
                    "Could not connect to the source database",
                    format!("{}:{}", config.host, config.port),
                    source: err
                )
            })?;

        Ok(TidbSource { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> TidbSource {
        TidbSource { pool }
    }
}

impl SourceDatabase for TidbSource {
    async fn current_position(&self) -> EtlResult<u64> {
        Ok(get_current_tso(&self.pool).await?)
    }

    async fn table_columns(&self, table: &TableName) -> EtlResult<Vec<TableColumn>> {
        let columns = get_table_columns(&self.pool, table).await?;
        if columns.is_empty() {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Source table has no columns",
                format!("table {table} does not exist or is not visible")
            );
        }

        Ok(columns)
    }
}
