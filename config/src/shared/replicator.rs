use serde::{Deserialize, Serialize};

use crate::shared::{
    CaptureConfig, DestinationConfig, RunMode, SnapshotConfig, SourceConfig, StorageConfig,
    ValidationError,
};

/// Complete configuration of one replicator process.
///
/// A process replicates exactly one source table. Several tables are replicated by running
/// several processes, each with its own storage root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReplicatorConfig {
    /// Source table as `schema.table`.
    pub table: String,
    #[serde(default)]
    pub mode: RunMode,
    /// Time zone used to interpret zone-less temporal values of the change log.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    pub destination: DestinationConfig,
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

impl ReplicatorConfig {
    /// Validates every section, stopping at the first problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.table.split_once('.') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {}
            _ => return Err(ValidationError::InvalidTableName(self.table.clone())),
        }
        if self.timezone.is_empty() {
            return Err(ValidationError::EmptyValue("timezone"));
        }

        self.source.validate()?;
        self.storage.validate()?;
        self.capture.validate()?;
        self.snapshot.validate()?;
        self.destination.validate()?;

        Ok(())
    }
}
