use gcp_bigquery_client::Client;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use tracing::info;

use crate::connector::SqlExecutor;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

/// Executes statements as BigQuery scripts through the jobs API.
///
/// A batch becomes one script, so `SET` statements and temporary tables are scoped to it.
pub struct BigQueryExecutor {
    project_id: String,
    client: Client,
}

impl BigQueryExecutor {
    /// Creates a new [`BigQueryExecutor`] from a service account key string.
    pub async fn new_with_key(project_id: String, sa_key: &str) -> EtlResult<BigQueryExecutor> {
        let sa_key = parse_service_account_key(sa_key)
            .map_err(|err| bq_error_to_etl_error(BQError::from(err)))?;
        let client = Client::from_service_account_key(sa_key, false)
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(BigQueryExecutor { project_id, client })
    }
}

impl SqlExecutor for BigQueryExecutor {
    async fn execute(&self, statements: &[String]) -> EtlResult<()> {
        if statements.is_empty() {
            return Ok(());
        }

        let script = statements.join(";\n");
        info!(statements = statements.len(), "running bigquery script");

        self.client
            .job()
            .query(&self.project_id, QueryRequest::new(script))
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(())
    }
}

/// Maps a BigQuery client error onto the error taxonomy.
fn bq_error_to_etl_error(err: BQError) -> EtlError {
    let (kind, description) = match &err {
        BQError::InvalidServiceAccountKey(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account key",
        ),
        BQError::InvalidServiceAccountAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account authenticator",
        ),
        BQError::AuthError(_) | BQError::YupAuthError(_) | BQError::NoToken => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication error",
        ),
        BQError::RequestError(_) => (
            ErrorKind::DestinationConnectionFailed,
            "BigQuery request failed",
        ),
        BQError::ResponseError { .. } => {
            (ErrorKind::DestinationQueryFailed, "BigQuery response error")
        }
        BQError::SerializationError(_) => (
            ErrorKind::SerializationError,
            "BigQuery JSON serialization error",
        ),
        _ => (ErrorKind::DestinationQueryFailed, "BigQuery query failed"),
    };

    etl_error!(kind, description, err.to_string(), source: err)
}
