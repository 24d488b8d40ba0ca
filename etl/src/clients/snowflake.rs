use std::collections::HashMap;
use std::time::Duration;

use config::SerializableSecretString;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clients::http_error;
use crate::connector::SqlExecutor;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Server-side timeout of one submitted batch, in seconds.
const STATEMENT_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Serialize)]
struct SubmitStatementRequest<'a> {
    statement: String,
    timeout: u64,
    database: &'a str,
    schema: &'a str,
    warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parameters: HashMap<&'static str, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    statement_handle: Option<String>,
    message: Option<String>,
}

/// Executes statements through the Snowflake SQL API.
///
/// A batch is submitted as one multi-statement request, so session settings and temporary
/// tables carry over between its statements.
#[derive(Debug, Clone)]
pub struct SnowflakeExecutor {
    client: Client,
    base_url: String,
    token: SerializableSecretString,
    database: String,
    schema: String,
    warehouse: String,
    role: Option<String>,
}

impl SnowflakeExecutor {
    pub fn new(
        account: &str,
        token: SerializableSecretString,
        database: String,
        schema: String,
        warehouse: String,
        role: Option<String>,
    ) -> SnowflakeExecutor {
        SnowflakeExecutor {
            client: Client::new(),
            base_url: format!("https://{account}.snowflakecomputing.com"),
            token,
            database,
            schema,
            warehouse,
            role,
        }
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header(
                "Authorization",
                format!("Bearer {}", self.token.expose_secret()),
            )
            .header("Accept", "application/json")
            .header(
                "X-Snowflake-Authorization-Token-Type",
                "PROGRAMMATIC_ACCESS_TOKEN",
            );

        match &self.role {
            Some(role) => request.header("X-Snowflake-Role", role),
            None => request,
        }
    }
}

impl SqlExecutor for SnowflakeExecutor {
    async fn execute(&self, statements: &[String]) -> EtlResult<()> {
        if statements.is_empty() {
            return Ok(());
        }

        let mut parameters = HashMap::new();
        parameters.insert("MULTI_STATEMENT_COUNT", statements.len().to_string());
        let request = SubmitStatementRequest {
            statement: statements.join(";\n"),
            timeout: STATEMENT_TIMEOUT_SECS,
            database: &self.database,
            schema: &self.schema,
            warehouse: &self.warehouse,
            role: self.role.as_deref(),
            parameters,
        };
        info!(statements = statements.len(), "submitting snowflake statements");

        let mut response = self
            .with_headers(
                self.client
                    .post(format!("{}/api/v2/statements", self.base_url)),
            )
            .json(&request)
            .send()
            .await?;

        while response.status() == StatusCode::ACCEPTED {
            let body: StatementResponse = response.json().await?;
            let handle = body.statement_handle.ok_or_else(|| {
                etl_error!(
                    ErrorKind::InvalidData,
                    "Snowflake response has no statement handle"
                )
            })?;
            debug!(statement_handle = %handle, "waiting for snowflake statements");
            tokio::time::sleep(POLL_INTERVAL).await;

            response = self
                .with_headers(
                    self.client
                        .get(format!("{}/api/v2/statements/{handle}", self.base_url)),
                )
                .send()
                .await?;
        }

        if !response.status().is_success() {
            return Err(http_error("Snowflake statements failed", response).await);
        }

        let body: StatementResponse = response.json().await?;
        debug!(message = ?body.message, "snowflake statements succeeded");

        Ok(())
    }
}
