//! Named failpoints used by crash and resume tests.
//!
//! Failpoints are inert unless the crate is built with the `failpoints` feature and a test
//! configures them through [`fail::cfg`].

use fail::fail_point;

use crate::error::EtlResult;

/// Fires after the changefeed exists and before the snapshot dump starts.
pub const AFTER_CHANGEFEED_CREATED: &str = "replicator.after_changefeed_created";
/// Fires after every snapshot file is loaded and before `snapshot/loadinfo` is written.
pub const BEFORE_SNAPSHOT_LOADINFO: &str = "replicator.before_snapshot_loadinfo";
/// Fires after an incremental file is applied and before the progress is persisted.
pub const BEFORE_INCREMENT_PROGRESS_SAVED: &str = "increment.before_progress_saved";

/// Returns an error when the failpoint `name` is configured with `return`.
pub fn etl_fail_point(name: &str) -> EtlResult<()> {
    fail_point!(name, |parameter| {
        #[cfg(feature = "failpoints")]
        let kind = crate::error::ErrorKind::InjectedFailure;
        #[cfg(not(feature = "failpoints"))]
        let kind = crate::error::ErrorKind::Unknown;

        let detail = match parameter {
            Some(parameter) => format!("The failpoint '{name}' returned an error: {parameter}"),
            None => format!("The failpoint '{name}' returned an error"),
        };

        Err(crate::etl_error!(kind, "An error occurred in a fail point", detail = detail))
    });

    Ok(())
}
