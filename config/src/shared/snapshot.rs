use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings for the external snapshot dumper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotConfig {
    /// Number of dump threads.
    #[serde(default = "default_concurrency")]
    pub concurrency: u16,
    /// Path or name of the `dumpling` executable.
    #[serde(default = "default_dumper_path")]
    pub dumper_path: String,
}

fn default_concurrency() -> u16 {
    8
}

fn default_dumper_path() -> String {
    "dumpling".to_owned()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            dumper_path: default_dumper_path(),
        }
    }
}

impl SnapshotConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::ZeroValue("snapshot.concurrency"));
        }
        if self.dumper_path.is_empty() {
            return Err(ValidationError::EmptyValue("snapshot.dumper_path"));
        }

        Ok(())
    }
}
