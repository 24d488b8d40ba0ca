use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Sub-directory receiving the snapshot dump.
pub const SNAPSHOT_DIR: &str = "snapshot";
/// Sub-directory receiving the change log.
pub const INCREMENT_DIR: &str = "increment";

/// Location of a replication workspace or one of its sub-directories.
///
/// The same URI is understood by this process, by the change-capture service and by the
/// snapshot dumper, so it is always kept in its canonical `scheme://bucket/prefix` form without
/// a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUri {
    url: Url,
}

impl StorageUri {
    /// Parses a storage root. Plain absolute paths are treated as `file://` URIs.
    pub fn parse(uri: &str) -> EtlResult<StorageUri> {
        let trimmed = uri.trim_end_matches('/');
        let url = if trimmed.starts_with('/') {
            Url::from_file_path(trimmed).map_err(|_| {
                etl_error!(ErrorKind::ConfigError, "Invalid storage path", trimmed)
            })?
        } else {
            Url::parse(trimmed)?
        };

        Ok(StorageUri { url })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Returns the bucket for object store URIs.
    pub fn bucket(&self) -> Option<&str> {
        self.url.host_str().filter(|host| !host.is_empty())
    }

    /// Returns the key prefix inside the bucket, without leading or trailing slashes.
    pub fn prefix(&self) -> &str {
        self.url.path().trim_matches('/')
    }

    /// Returns the local directory of a `file://` URI.
    pub fn local_path(&self) -> Option<PathBuf> {
        if self.scheme() == "file" {
            self.url.to_file_path().ok()
        } else {
            None
        }
    }

    /// Returns the URI of `path` below this location.
    pub fn join(&self, path: &str) -> EtlResult<StorageUri> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Ok(self.clone());
        }

        let joined = format!("{}/{}", self.url.as_str().trim_end_matches('/'), path);
        Ok(StorageUri {
            url: Url::parse(&joined)?,
        })
    }

    /// Returns the full URI string of a file below this location.
    pub fn file_uri(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Returns the path of `file_uri` relative to this location, if it lies below it.
    pub fn relative_path<'a>(&self, file_uri: &'a str) -> Option<&'a str> {
        let root = self.url.as_str().trim_end_matches('/');
        file_uri
            .strip_prefix(root)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
    }

    pub fn snapshot(&self) -> EtlResult<StorageUri> {
        self.join(SNAPSHOT_DIR)
    }

    pub fn increment(&self) -> EtlResult<StorageUri> {
        self.join(INCREMENT_DIR)
    }

    /// Returns a copy of this URI with the given query parameters appended.
    pub fn with_query_params<'a>(
        &self,
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> StorageUri {
        let mut url = self.url.clone();
        url.query_pairs_mut().extend_pairs(params);

        StorageUri { url }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for StorageUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_sub_roots() {
        let root = StorageUri::parse("s3://bucket/etl/orders/").unwrap();

        assert_eq!(root.as_str(), "s3://bucket/etl/orders");
        assert_eq!(root.bucket(), Some("bucket"));
        assert_eq!(root.prefix(), "etl/orders");
        assert_eq!(
            root.snapshot().unwrap().as_str(),
            "s3://bucket/etl/orders/snapshot"
        );
        assert_eq!(
            root.increment().unwrap().as_str(),
            "s3://bucket/etl/orders/increment"
        );
        assert_eq!(
            root.file_uri("snapshot/sales.orders.000000000.csv"),
            "s3://bucket/etl/orders/snapshot/sales.orders.000000000.csv"
        );
        assert_eq!(
            root.relative_path("s3://bucket/etl/orders/increment/sales/orders/1/CDC1.csv"),
            Some("increment/sales/orders/1/CDC1.csv")
        );
        assert_eq!(root.relative_path("s3://bucket/etl/other/CDC1.csv"), None);
    }

    #[test]
    fn treats_absolute_paths_as_local_files() {
        let root = StorageUri::parse("/tmp/etl").unwrap();

        assert_eq!(root.scheme(), "file");
        assert_eq!(root.local_path(), Some(PathBuf::from("/tmp/etl")));
    }

    #[test]
    fn appends_query_parameters() {
        let root = StorageUri::parse("s3://bucket/etl").unwrap();
        let sink = root
            .increment()
            .unwrap()
            .with_query_params([("protocol", "csv"), ("flush-interval", "60s")]);

        assert_eq!(
            sink.as_str(),
            "s3://bucket/etl/increment?protocol=csv&flush-interval=60s"
        );
    }
}
