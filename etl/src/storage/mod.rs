//! Access to the replication workspace shared with the change-capture service and the dumper.

mod backend;
mod base;
#[cfg(feature = "gcs")]
pub mod gcs;
pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;
mod uri;

pub use backend::StorageBackend;
pub use base::ExternalStorage;
pub use uri::{INCREMENT_DIR, SNAPSHOT_DIR, StorageUri};
