use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// User-selected restriction on which replication stages execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Change capture, snapshot dump, snapshot load and incremental replay.
    #[default]
    Full,
    /// Snapshot dump and load only.
    SnapshotOnly,
    /// Change capture and incremental replay only.
    IncrementalOnly,
    /// Snapshot and change log are produced externally; only loading happens here.
    Cloud,
}

impl RunMode {
    pub const ALL: [RunMode; 4] = [
        RunMode::Full,
        RunMode::SnapshotOnly,
        RunMode::IncrementalOnly,
        RunMode::Cloud,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::SnapshotOnly => "snapshot-only",
            RunMode::IncrementalOnly => "incremental-only",
            RunMode::Cloud => "cloud",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownRunMode(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_serde() {
        for mode in RunMode::ALL {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode.as_str()));
            assert_eq!(serde_json::from_str::<RunMode>(&json).unwrap(), mode);
            assert_eq!(mode.as_str().parse::<RunMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!("partial".parse::<RunMode>().is_err());
    }
}
