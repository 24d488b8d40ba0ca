use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::storage::{ExternalStorage, StorageUri};

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<String, Bytes>,
    failing_paths: HashSet<String>,
}

/// In-memory storage for tests and local experiments.
///
/// Clones share the same objects, so a test can keep a handle to inspect what the pipeline wrote
/// and to play the part of the external writers (dumper and change capture). Paths registered
/// through [`MemoryStorage::fail_on`] make every operation touching them fail.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    uri: StorageUri,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new(uri: StorageUri) -> Self {
        Self {
            uri,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Stores an object directly, as an external writer would.
    pub async fn put(&self, path: &str, contents: impl Into<Bytes>) {
        let mut inner = self.inner.lock().await;
        inner.files.insert(path.to_owned(), contents.into());
    }

    pub async fn remove(&self, path: &str) {
        let mut inner = self.inner.lock().await;
        inner.files.remove(path);
    }

    pub async fn contents(&self, path: &str) -> Option<Bytes> {
        let inner = self.inner.lock().await;
        inner.files.get(path).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.files.keys().cloned().collect()
    }

    /// Makes every operation on `path` fail with a storage error.
    pub async fn fail_on(&self, path: &str) {
        let mut inner = self.inner.lock().await;
        inner.failing_paths.insert(path.to_owned());
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing_paths.clear();
    }

    fn check(inner: &Inner, path: &str) -> EtlResult<()> {
        if inner.failing_paths.contains(path) {
            return Err(etl_error!(
                ErrorKind::StorageError,
                "Storage request failed",
                path
            ));
        }

        Ok(())
    }
}

impl ExternalStorage for MemoryStorage {
    fn uri(&self) -> &StorageUri {
        &self.uri
    }

    async fn file_exists(&self, path: &str) -> EtlResult<bool> {
        let inner = self.inner.lock().await;
        Self::check(&inner, path)?;

        Ok(inner.files.contains_key(path))
    }

    async fn read_file(&self, path: &str) -> EtlResult<Bytes> {
        let inner = self.inner.lock().await;
        Self::check(&inner, path)?;

        inner.files.get(path).cloned().ok_or_else(|| {
            etl_error!(
                ErrorKind::StorageObjectMissing,
                "Storage object not found",
                path
            )
        })
    }

    async fn write_file(&self, path: &str, contents: Bytes) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        Self::check(&inner, path)?;

        inner.files.insert(path.to_owned(), contents);

        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> EtlResult<Vec<String>> {
        let inner = self.inner.lock().await;
        Self::check(&inner, prefix)?;

        Ok(inner
            .files
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect())
    }
}
