use bytes::Bytes;
use std::future::Future;

use crate::error::EtlResult;
use crate::storage::StorageUri;

/// Object storage holding the replication workspace.
///
/// Paths are relative to [`ExternalStorage::uri`] and always use `/` as separator. The snapshot
/// dumper and the change-capture service write into the same location, so implementations must
/// not assume that every object was written through this trait.
pub trait ExternalStorage: Send + Sync {
    /// Returns the root of this storage.
    fn uri(&self) -> &StorageUri;

    /// Returns whether an object exists at `path`.
    ///
    /// A missing object is `Ok(false)`; an error means existence could not be determined.
    fn file_exists(&self, path: &str) -> impl Future<Output = EtlResult<bool>> + Send;

    /// Reads the whole object at `path`.
    ///
    /// Fails with [`crate::error::ErrorKind::StorageObjectMissing`] when there is none.
    fn read_file(&self, path: &str) -> impl Future<Output = EtlResult<Bytes>> + Send;

    /// Writes `contents` to `path`, replacing any existing object.
    fn write_file(&self, path: &str, contents: Bytes) -> impl Future<Output = EtlResult<()>> + Send;

    /// Lists the paths of all objects whose path starts with `prefix`, sorted.
    fn list_files(&self, prefix: &str) -> impl Future<Output = EtlResult<Vec<String>>> + Send;
}
