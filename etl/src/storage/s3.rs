use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use config::shared::StorageConfig;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::storage::{ExternalStorage, StorageUri};

fn s3_error<E>(description: &'static str, err: E) -> EtlError
where
    E: std::error::Error,
{
    etl_error!(
        ErrorKind::StorageError,
        description,
        DisplayErrorContext(&err)
    )
}

/// Storage backed by an S3 bucket or an S3-compatible object store.
#[derive(Debug, Clone)]
pub struct S3Storage {
    uri: StorageUri,
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    pub async fn connect(uri: StorageUri, config: &StorageConfig) -> EtlResult<Self> {
        let Some(bucket) = uri.bucket().map(str::to_owned) else {
            return Err(etl_error!(
                ErrorKind::ConfigError,
                "S3 storage URI has no bucket",
                uri
            ));
        };

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.expose_secret().clone(),
                None,
                None,
                "etl-config",
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let prefix = uri.prefix().to_owned();
        debug!(%bucket, %prefix, "created s3 storage client");

        Ok(Self {
            uri,
            client: Client::from_conf(builder.build()),
            bucket,
            prefix,
        })
    }

    fn key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.prefix.is_empty() {
            path.to_owned()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn relative<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return key;
        }

        key.strip_prefix(&self.prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(key)
    }
}

impl ExternalStorage for S3Storage {
    fn uri(&self) -> &StorageUri {
        &self.uri
    }

    async fn file_exists(&self, path: &str) -> EtlResult<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|err| err.is_not_found()) => Ok(false),
            Err(err) => Err(s3_error("Failed to check S3 object", err)),
        }
    }

    async fn read_file(&self, path: &str) -> EtlResult<Bytes> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|err| err.is_no_such_key()) => {
                return Err(etl_error!(
                    ErrorKind::StorageObjectMissing,
                    "Storage object not found",
                    path
                ));
            }
            Err(err) => return Err(s3_error("Failed to read S3 object", err)),
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|err| s3_error("Failed to read S3 object body", err))?;

        Ok(body.into_bytes())
    }

    async fn write_file(&self, path: &str, contents: Bytes) -> EtlResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .body(ByteStream::from(contents))
            .send()
            .await
            .map_err(|err| s3_error("Failed to write S3 object", err))?;

        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> EtlResult<Vec<String>> {
        let mut files = Vec::new();
        let mut continuation_token = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(self.key(prefix))
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|err| s3_error("Failed to list S3 objects", err))?;

            files.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(|key| self.relative(key).to_owned()),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_owned());
                }
                _ => break,
            }
        }

        files.sort();

        Ok(files)
    }
}
