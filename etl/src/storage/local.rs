use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::storage::{ExternalStorage, StorageUri};

/// Storage backed by a directory on the local file system.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    uri: StorageUri,
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(uri: StorageUri) -> EtlResult<Self> {
        let Some(root) = uri.local_path() else {
            return Err(etl_error!(
                ErrorKind::ConfigError,
                "Local storage requires a file URI",
                uri
            ));
        };

        Ok(Self { uri, root })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect();

        Some(parts.join("/"))
    }
}

impl ExternalStorage for LocalStorage {
    fn uri(&self) -> &StorageUri {
        &self.uri
    }

    async fn file_exists(&self, path: &str) -> EtlResult<bool> {
        let exists = fs::try_exists(self.resolve(path)).await?;

        Ok(exists)
    }

    async fn read_file(&self, path: &str) -> EtlResult<Bytes> {
        match fs::read(self.resolve(path)).await {
            Ok(contents) => Ok(Bytes::from(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(etl_error!(
                ErrorKind::StorageObjectMissing,
                "Storage object not found",
                path
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_file(&self, path: &str, contents: Bytes) -> EtlResult<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Readers never observe a partially written object.
        let mut staging = target.clone().into_os_string();
        staging.push(".tmp");
        fs::write(&staging, &contents).await?;
        fs::rename(&staging, &target).await?;

        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> EtlResult<Vec<String>> {
        let prefix = prefix.trim_start_matches('/');
        let directory = match prefix.rfind('/') {
            Some(index) => self.resolve(&prefix[..index]),
            None => self.root.clone(),
        };

        let mut files = Vec::new();
        let mut pending = vec![directory];
        while let Some(directory) = pending.pop() {
            let mut entries = match fs::read_dir(&directory).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                if let Some(relative) = self.relative(&path)
                    && relative.starts_with(prefix)
                    && !relative.ends_with(".tmp")
                {
                    files.push(relative);
                }
            }
        }

        files.sort();

        Ok(files)
    }
}
