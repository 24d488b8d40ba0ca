use bytes::Bytes;
use gcp_bigquery_client::yup_oauth2::authenticator::DefaultAuthenticator;
use gcp_bigquery_client::yup_oauth2::{ServiceAccountAuthenticator, parse_service_account_key};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::storage::{ExternalStorage, StorageUri};

const GCS_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const GCS_API_URL: &str = "https://storage.googleapis.com/storage/v1/b";
const GCS_UPLOAD_URL: &str = "https://storage.googleapis.com/upload/storage/v1/b";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

/// Storage backed by a Google Cloud Storage bucket, accessed through the JSON API.
#[derive(Clone)]
pub struct GcsStorage {
    uri: StorageUri,
    client: Client,
    authenticator: Arc<DefaultAuthenticator>,
    bucket: String,
    prefix: String,
}

impl GcsStorage {
    /// Creates a storage client authenticated with a service account key (JSON).
    pub async fn connect(uri: StorageUri, service_account_key: &str) -> EtlResult<Self> {
        let Some(bucket) = uri.bucket().map(str::to_owned) else {
            return Err(etl_error!(
                ErrorKind::ConfigError,
                "GCS storage URI has no bucket",
                uri
            ));
        };

        let key = parse_service_account_key(service_account_key).map_err(|err| {
            etl_error!(
                ErrorKind::AuthenticationError,
                "Invalid GCS service account key",
                err
            )
        })?;
        let authenticator = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::AuthenticationError,
                    "Failed to build GCS authenticator",
                    err
                )
            })?;

        let prefix = uri.prefix().to_owned();

        Ok(Self {
            uri,
            client: Client::new(),
            authenticator: Arc::new(authenticator),
            bucket,
            prefix,
        })
    }

    async fn token(&self) -> EtlResult<String> {
        let token = self
            .authenticator
            .token(&[GCS_SCOPE])
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::AuthenticationError,
                    "Failed to obtain GCS access token",
                    err
                )
            })?;

        token.token().map(str::to_owned).ok_or_else(|| {
            etl_error!(
                ErrorKind::AuthenticationError,
                "GCS access token is empty"
            )
        })
    }

    fn object_name(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.prefix.is_empty() {
            path.to_owned()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    fn object_url(&self, path: &str) -> EtlResult<Url> {
        let mut url = Url::parse(GCS_API_URL)?;
        url.path_segments_mut()
            .map_err(|_| etl_error!(ErrorKind::ConfigError, "Invalid GCS API URL"))?
            .push(&self.bucket)
            .push("o")
            .push(&self.object_name(path));

        Ok(url)
    }

    fn bucket_url(&self, base: &str) -> EtlResult<Url> {
        let mut url = Url::parse(base)?;
        url.path_segments_mut()
            .map_err(|_| etl_error!(ErrorKind::ConfigError, "Invalid GCS API URL"))?
            .push(&self.bucket)
            .push("o");

        Ok(url)
    }

    fn relative<'a>(&self, name: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return name;
        }

        name.strip_prefix(&self.prefix)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(name)
    }
}

impl ExternalStorage for GcsStorage {
    fn uri(&self) -> &StorageUri {
        &self.uri
    }

    async fn file_exists(&self, path: &str) -> EtlResult<bool> {
        let response = self
            .client
            .get(self.object_url(path)?)
            .bearer_auth(self.token().await?)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(etl_error!(
                ErrorKind::StorageError,
                "Failed to check GCS object",
                format!("{path}: HTTP {status}")
            )),
        }
    }

    async fn read_file(&self, path: &str) -> EtlResult<Bytes> {
        let mut url = self.object_url(path)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .client
            .get(url)
            .bearer_auth(self.token().await?)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(etl_error!(
                ErrorKind::StorageObjectMissing,
                "Storage object not found",
                path
            )),
            status if status.is_success() => Ok(response.bytes().await?),
            status => Err(etl_error!(
                ErrorKind::StorageError,
                "Failed to read GCS object",
                format!("{path}: HTTP {status}")
            )),
        }
    }

    async fn write_file(&self, path: &str, contents: Bytes) -> EtlResult<()> {
        let mut url = self.bucket_url(GCS_UPLOAD_URL)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &self.object_name(path));

        self.client
            .post(url)
            .bearer_auth(self.token().await?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(contents)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> EtlResult<Vec<String>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.bucket_url(GCS_API_URL)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", &self.object_name(prefix));
                query.append_pair("fields", "items(name),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let list: ObjectList = self
                .client
                .get(url)
                .bearer_auth(self.token().await?)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            files.extend(
                list.items
                    .iter()
                    .map(|item| self.relative(&item.name).to_owned()),
            );

            match list.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        files.sort();

        Ok(files)
    }
}
