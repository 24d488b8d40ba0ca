use config::shared::RunMode;
use std::fmt;

/// Point in the replication lifecycle, derived from the markers present in storage.
///
/// Stages are strictly ordered: every stage implies that the markers of all earlier stages exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// No marker exists yet.
    Init,
    /// The changefeed has flushed its first checkpoint (`increment/metadata`).
    ChangefeedCreated,
    /// The snapshot dump completed (`snapshot/metadata`).
    SnapshotDumped,
    /// The snapshot was loaded into the destination (`snapshot/loadinfo`).
    SnapshotLoaded,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Init,
        Stage::ChangefeedCreated,
        Stage::SnapshotDumped,
        Stage::SnapshotLoaded,
    ];

    /// Returns the action executed when the orchestrator reaches this stage.
    pub fn action(&self) -> StageAction {
        match self {
            Stage::Init => StageAction::CreateChangefeed,
            Stage::ChangefeedCreated => StageAction::DumpSnapshot,
            Stage::SnapshotDumped => StageAction::LoadSnapshot,
            Stage::SnapshotLoaded => StageAction::LoadIncrement,
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::ChangefeedCreated),
            Stage::ChangefeedCreated => Some(Stage::SnapshotDumped),
            Stage::SnapshotDumped => Some(Stage::SnapshotLoaded),
            Stage::SnapshotLoaded => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::ChangefeedCreated => "changefeed-created",
            Stage::SnapshotDumped => "snapshot-dumped",
            Stage::SnapshotLoaded => "snapshot-loaded",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work performed when entering a [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageAction {
    CreateChangefeed,
    DumpSnapshot,
    LoadSnapshot,
    LoadIncrement,
}

impl StageAction {
    /// Returns whether `mode` executes this action.
    pub fn runs_in(&self, mode: RunMode) -> bool {
        match self {
            StageAction::CreateChangefeed => {
                !matches!(mode, RunMode::SnapshotOnly | RunMode::Cloud)
            }
            StageAction::DumpSnapshot => !matches!(mode, RunMode::IncrementalOnly | RunMode::Cloud),
            StageAction::LoadSnapshot => mode != RunMode::IncrementalOnly,
            StageAction::LoadIncrement => mode != RunMode::SnapshotOnly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageAction::CreateChangefeed => "create-changefeed",
            StageAction::DumpSnapshot => "dump-snapshot",
            StageAction::LoadSnapshot => "load-snapshot",
            StageAction::LoadIncrement => "load-increment",
        }
    }
}

impl fmt::Display for StageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the stage table: the action of `stage` and whether `mode` executes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAction {
    pub stage: Stage,
    pub action: StageAction,
    pub enabled: bool,
}

/// Walks the stage table from `stage` to the last stage.
///
/// Entering a stage runs its action and then falls through to every following stage, so
/// resuming from an earlier stage replays all remaining actions once.
pub fn stage_table(stage: Stage, mode: RunMode) -> Vec<PlannedAction> {
    let mut rows = Vec::with_capacity(Stage::ALL.len());
    let mut current = Some(stage);
    while let Some(stage) = current {
        let action = stage.action();
        rows.push(PlannedAction {
            stage,
            action,
            enabled: action.runs_in(mode),
        });
        current = stage.next();
    }

    rows
}

/// Returns the actions to execute, in order, when entering at `stage` under `mode`.
pub fn plan(stage: Stage, mode: RunMode) -> Vec<StageAction> {
    stage_table(stage, mode)
        .into_iter()
        .filter(|row| row.enabled)
        .map(|row| row.action)
        .collect()
}
