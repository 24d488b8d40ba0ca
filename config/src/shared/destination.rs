use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Warehouse the replicated table is written to.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    BigQuery {
        /// Google Cloud project hosting the dataset.
        project_id: String,
        dataset_id: String,
        /// Service account key JSON. Redacted in debug output.
        service_account_key: SerializableSecretString,
    },
    Databricks {
        /// Workspace host, e.g. `dbc-123.cloud.databricks.com`.
        host: String,
        /// Personal access token or OAuth token.
        token: SerializableSecretString,
        catalog: String,
        schema: String,
        /// SQL warehouse executing the statements.
        warehouse_id: String,
    },
    Snowflake {
        /// Account identifier, e.g. `orgname-account`.
        account: String,
        token: SerializableSecretString,
        database: String,
        schema: String,
        warehouse: String,
        role: Option<String>,
        /// External stage pointing at the storage root.
        stage: String,
    },
}

impl DestinationConfig {
    pub fn name(&self) -> &'static str {
        match self {
            DestinationConfig::BigQuery { .. } => "bigquery",
            DestinationConfig::Databricks { .. } => "databricks",
            DestinationConfig::Snowflake { .. } => "snowflake",
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let required: Vec<(&'static str, &str)> = match self {
            DestinationConfig::BigQuery {
                project_id,
                dataset_id,
                ..
            } => vec![
                ("destination.big_query.project_id", project_id.as_str()),
                ("destination.big_query.dataset_id", dataset_id.as_str()),
            ],
            DestinationConfig::Databricks {
                host,
                catalog,
                schema,
                warehouse_id,
                ..
            } => vec![
                ("destination.databricks.host", host.as_str()),
                ("destination.databricks.catalog", catalog.as_str()),
                ("destination.databricks.schema", schema.as_str()),
                ("destination.databricks.warehouse_id", warehouse_id.as_str()),
            ],
            DestinationConfig::Snowflake {
                account,
                database,
                schema,
                warehouse,
                stage,
                ..
            } => vec![
                ("destination.snowflake.account", account.as_str()),
                ("destination.snowflake.database", database.as_str()),
                ("destination.snowflake.schema", schema.as_str()),
                ("destination.snowflake.warehouse", warehouse.as_str()),
                ("destination.snowflake.stage", stage.as_str()),
            ],
        };

        for (key, value) in required {
            if value.is_empty() {
                return Err(ValidationError::EmptyValue(key));
            }
        }

        Ok(())
    }
}
