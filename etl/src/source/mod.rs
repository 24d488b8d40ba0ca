//! The source side: the TiDB cluster and the two tools that read from it, the change-capture
//! service and the snapshot dumper.

mod base;
pub mod cdc;
pub mod database;
pub mod dump;
mod upstream;

pub use base::{
    ChangefeedRequest, ChangefeedService, ChangefeedStatus, DumpProgress, DumpRequest,
    SnapshotDumper, SourceDatabase, StartPosition,
};
pub use upstream::{TidbUpstream, Upstream};
