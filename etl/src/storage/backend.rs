use bytes::Bytes;
use config::shared::StorageConfig;
#[cfg(feature = "gcs")]
use secrecy::ExposeSecret;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::storage::local::LocalStorage;
use crate::storage::{ExternalStorage, StorageUri};

/// Storage selected at runtime from the scheme of the configured root.
#[derive(Clone)]
pub enum StorageBackend {
    Local(LocalStorage),
    #[cfg(feature = "s3")]
    S3(crate::storage::s3::S3Storage),
    #[cfg(feature = "gcs")]
    Gcs(crate::storage::gcs::GcsStorage),
}

impl StorageBackend {
    pub async fn open(config: &StorageConfig) -> EtlResult<Self> {
        let uri = StorageUri::parse(&config.uri)?;

        match uri.scheme() {
            "file" => Ok(StorageBackend::Local(LocalStorage::new(uri)?)),
            #[cfg(feature = "s3")]
            "s3" => Ok(StorageBackend::S3(
                crate::storage::s3::S3Storage::connect(uri, config).await?,
            )),
            #[cfg(feature = "gcs")]
            "gs" | "gcs" => {
                let Some(key) = &config.service_account_key else {
                    return Err(etl_error!(
                        ErrorKind::ConfigError,
                        "GCS storage requires a service account key"
                    ));
                };

                Ok(StorageBackend::Gcs(
                    crate::storage::gcs::GcsStorage::connect(uri, key.expose_secret()).await?,
                ))
            }
            scheme => Err(etl_error!(
                ErrorKind::ConfigError,
                "Storage scheme is not supported by this build",
                scheme
            )),
        }
    }
}

impl ExternalStorage for StorageBackend {
    fn uri(&self) -> &StorageUri {
        match self {
            StorageBackend::Local(storage) => storage.uri(),
            #[cfg(feature = "s3")]
            StorageBackend::S3(storage) => storage.uri(),
            #[cfg(feature = "gcs")]
            StorageBackend::Gcs(storage) => storage.uri(),
        }
    }

    async fn file_exists(&self, path: &str) -> EtlResult<bool> {
        match self {
            StorageBackend::Local(storage) => storage.file_exists(path).await,
            #[cfg(feature = "s3")]
            StorageBackend::S3(storage) => storage.file_exists(path).await,
            #[cfg(feature = "gcs")]
            StorageBackend::Gcs(storage) => storage.file_exists(path).await,
        }
    }

    async fn read_file(&self, path: &str) -> EtlResult<Bytes> {
        match self {
            StorageBackend::Local(storage) => storage.read_file(path).await,
            #[cfg(feature = "s3")]
            StorageBackend::S3(storage) => storage.read_file(path).await,
            #[cfg(feature = "gcs")]
            StorageBackend::Gcs(storage) => storage.read_file(path).await,
        }
    }

    async fn write_file(&self, path: &str, contents: Bytes) -> EtlResult<()> {
        match self {
            StorageBackend::Local(storage) => storage.write_file(path, contents).await,
            #[cfg(feature = "s3")]
            StorageBackend::S3(storage) => storage.write_file(path, contents).await,
            #[cfg(feature = "gcs")]
            StorageBackend::Gcs(storage) => storage.write_file(path, contents).await,
        }
    }

    async fn list_files(&self, prefix: &str) -> EtlResult<Vec<String>> {
        match self {
            StorageBackend::Local(storage) => storage.list_files(prefix).await,
            #[cfg(feature = "s3")]
            StorageBackend::S3(storage) => storage.list_files(prefix).await,
            #[cfg(feature = "gcs")]
            StorageBackend::Gcs(storage) => storage.list_files(prefix).await,
        }
    }
}
