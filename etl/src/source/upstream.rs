use tidb::types::{TableColumn, TableName};

use crate::error::EtlResult;
use crate::source::cdc::TiCdcClient;
use crate::source::database::TidbSource;
use crate::source::dump::DumplingRunner;
use crate::source::{
    ChangefeedRequest, ChangefeedService, ChangefeedStatus, DumpProgress, DumpRequest,
    SnapshotDumper, SourceDatabase,
};

/// Every collaborator on the source side of the pipeline.
pub trait Upstream: SourceDatabase + ChangefeedService + SnapshotDumper {}

impl<T> Upstream for T where T: SourceDatabase + ChangefeedService + SnapshotDumper {}

/// The production upstream: a TiDB cluster, its TiCDC server and the Dumpling binary.
#[derive(Debug, Clone)]
pub struct TidbUpstream {
    source: TidbSource,
    cdc: TiCdcClient,
    dumper: DumplingRunner,
}

impl TidbUpstream {
    pub fn new(source: TidbSource, cdc: TiCdcClient, dumper: DumplingRunner) -> TidbUpstream {
        TidbUpstream {
            source,
            cdc,
            dumper,
        }
    }
}

impl SourceDatabase for TidbUpstream {
    async fn current_position(&self) -> EtlResult<u64> {
        self.source.current_position().await
    }

    async fn table_columns(&self, table: &TableName) -> EtlResult<Vec<TableColumn>> {
        self.source.table_columns(table).await
    }
}

impl ChangefeedService for TidbUpstream {
    async fn create_changefeed(&self, request: &ChangefeedRequest) -> EtlResult<ChangefeedStatus> {
        self.cdc.create_changefeed(request).await
    }
}

impl SnapshotDumper for TidbUpstream {
    async fn dump(
        &self,
        request: &DumpRequest,
        progress: &(dyn Fn(DumpProgress) + Send + Sync),
    ) -> EtlResult<()> {
        self.dumper.dump(request, progress).await
    }
}
