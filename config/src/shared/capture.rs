use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings of the TiCDC change-capture service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CaptureConfig {
    /// Host of the TiCDC open API.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// How often TiCDC flushes change-log files to storage.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Size threshold after which TiCDC starts a new change-log file.
    #[serde(default = "default_file_size_bytes")]
    pub file_size_bytes: u64,
}

fn default_port() -> u16 {
    8300
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_file_size_bytes() -> u64 {
    64 * 1024 * 1024
}

impl CaptureConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::EmptyValue("capture.host"));
        }
        if self.flush_interval_secs == 0 {
            return Err(ValidationError::ZeroValue("capture.flush_interval_secs"));
        }
        if self.file_size_bytes == 0 {
            return Err(ValidationError::ZeroValue("capture.file_size_bytes"));
        }

        Ok(())
    }
}
