use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Connection settings for the TiDB source cluster.
///
/// TiDB speaks the MySQL wire protocol, so the same settings are handed to `sqlx` for metadata
/// queries and to the snapshot dumper on its command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// Hostname or IP address of a TiDB server.
    pub host: String,
    /// MySQL protocol port of the TiDB server.
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    /// Password of `username`. Redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

fn default_port() -> u16 {
    4000
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::EmptyValue("source.host"));
        }
        if self.username.is_empty() {
            return Err(ValidationError::EmptyValue("source.username"));
        }

        Ok(())
    }

    /// Returns `sqlx` options without a default database, queries always qualify table names.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username);

        match &self.password {
            Some(password) => options.password(password.expose_secret()),
            None => options,
        }
    }
}
