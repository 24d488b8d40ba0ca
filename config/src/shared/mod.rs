mod base;
mod capture;
mod destination;
mod mode;
mod replicator;
mod snapshot;
mod source;
mod storage;

pub use base::*;
pub use capture::*;
pub use destination::*;
pub use mode::*;
pub use replicator::*;
pub use snapshot::*;
pub use source::*;
pub use storage::*;
