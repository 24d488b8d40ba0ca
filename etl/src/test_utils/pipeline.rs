use config::shared::{ReplicatorConfig, RunMode};

use crate::pipeline::Pipeline;
use crate::storage::memory::MemoryStorage;
use crate::test_utils::connector::MemoryConnector;
use crate::test_utils::fixtures::{memory_storage, orders_columns, test_config};
use crate::test_utils::source::FakeUpstream;

pub type TestPipeline = Pipeline<MemoryStorage, MemoryConnector, FakeUpstream>;

/// Storage, warehouse and upstream doubles replicating `sales.orders`.
///
/// The doubles share their state with every pipeline created from the environment, so a test
/// can run the pipeline several times to simulate restarts and inspect what each run left behind.
#[derive(Debug, Clone)]
pub struct TestEnvironment {
    pub storage: MemoryStorage,
    pub connector: MemoryConnector,
    pub upstream: FakeUpstream,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let storage = memory_storage();

        Self {
            connector: MemoryConnector::new(storage.clone()),
            upstream: FakeUpstream::new(orders_columns(), storage.clone()),
            storage,
        }
    }

    pub fn pipeline(&self, mode: RunMode) -> TestPipeline {
        self.pipeline_with_config(test_config(mode))
    }

    pub fn pipeline_with_config(&self, config: ReplicatorConfig) -> TestPipeline {
        Pipeline::new(
            config,
            self.storage.clone(),
            self.connector.clone(),
            self.upstream.clone(),
        )
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
