use std::time::Duration;

use config::SerializableSecretString;
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bail;
use crate::clients::http_error;
use crate::connector::SqlExecutor;
use crate::error::{ErrorKind, EtlResult};

/// How long the statement API blocks before answering with a pending statement.
const WAIT_TIMEOUT: &str = "50s";
/// Delay between status polls of a statement still running after [`WAIT_TIMEOUT`].
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct ExecuteStatementRequest<'a> {
    statement: &'a str,
    warehouse_id: &'a str,
    catalog: &'a str,
    schema: &'a str,
    wait_timeout: &'static str,
    on_wait_timeout: &'static str,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    statement_id: String,
    status: StatementStatus,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: String,
    error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    message: String,
}

impl StatementStatus {
    fn is_running(&self) -> bool {
        matches!(self.state.as_str(), "PENDING" | "RUNNING")
    }
}

/// Executes statements through the Databricks SQL statement execution API.
///
/// The API has no multi-statement sessions, so statements run one after another and the first
/// failure stops the batch.
#[derive(Debug, Clone)]
pub struct DatabricksExecutor {
    client: Client,
    base_url: String,
    token: SerializableSecretString,
    warehouse_id: String,
    catalog: String,
    schema: String,
}

impl DatabricksExecutor {
    pub fn new(
        host: &str,
        token: SerializableSecretString,
        warehouse_id: String,
        catalog: String,
        schema: String,
    ) -> DatabricksExecutor {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_owned()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };

        DatabricksExecutor {
            client: Client::new(),
            base_url,
            token,
            warehouse_id,
            catalog,
            schema,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    async fn execute_statement(&self, statement: &str) -> EtlResult<()> {
        let request = ExecuteStatementRequest {
            statement,
            warehouse_id: &self.warehouse_id,
            catalog: &self.catalog,
            schema: &self.schema,
            wait_timeout: WAIT_TIMEOUT,
            on_wait_timeout: "CONTINUE",
        };

        let response = self
            .client
            .post(format!("{}/api/2.0/sql/statements", self.base_url))
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await?;
        let mut result = parse_response(response).await?;

        while result.status.is_running() {
            debug!(statement_id = %result.statement_id, state = %result.status.state, "waiting for databricks statement");
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = self
                .client
                .get(format!(
                    "{}/api/2.0/sql/statements/{}",
                    self.base_url, result.statement_id
                ))
                .header("Authorization", self.bearer())
                .send()
                .await?;
            result = parse_response(response).await?;
        }

        if result.status.state != "SUCCEEDED" {
            let message = result
                .status
                .error
                .map(|error| error.message)
                .unwrap_or_else(|| "no error details".to_owned());
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Databricks statement failed",
                format!("statement ended in state {}: {message}", result.status.state)
            );
        }

        Ok(())
    }
}

async fn parse_response(response: Response) -> EtlResult<StatementResponse> {
    if !response.status().is_success() {
        return Err(http_error("Databricks statement API returned an error", response).await);
    }

    Ok(response.json().await?)
}

impl SqlExecutor for DatabricksExecutor {
    async fn execute(&self, statements: &[String]) -> EtlResult<()> {
        for statement in statements {
            info!(statement = %statement, "executing databricks statement");
            self.execute_statement(statement).await?;
        }

        Ok(())
    }
}
