use serde::{Deserialize, Serialize};
use url::Url;

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Schemes accepted for the storage root.
pub const SUPPORTED_STORAGE_SCHEMES: [&str; 4] = ["s3", "gs", "gcs", "file"];

/// Durable storage shared by the change-capture service, the snapshot dumper and the warehouse
/// loaders.
///
/// Snapshot files land under `<uri>/snapshot` and the change log under `<uri>/increment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Root of the replication workspace, e.g. `s3://bucket/prefix`.
    pub uri: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible object stores.
    pub endpoint: Option<String>,
    /// Static credentials. The ambient credential chain is used when absent.
    pub credentials: Option<StorageCredentials>,
    /// Service account key (JSON) for `gs://` and `gcs://` roots.
    #[serde(default)]
    pub service_account_key: Option<SerializableSecretString>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageCredentials {
    pub access_key_id: String,
    pub secret_access_key: SerializableSecretString,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.uri.is_empty() {
            return Err(ValidationError::EmptyValue("storage.uri"));
        }

        let url =
            Url::parse(&self.uri).map_err(|_| ValidationError::InvalidStorageUri(self.uri.clone()))?;
        if !SUPPORTED_STORAGE_SCHEMES.contains(&url.scheme()) {
            return Err(ValidationError::UnsupportedStorageScheme(
                url.scheme().to_owned(),
            ));
        }

        Ok(())
    }
}
