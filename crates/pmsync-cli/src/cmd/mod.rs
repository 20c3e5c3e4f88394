pub mod config;
pub mod directory;
pub mod prune;
pub mod reconcile;

use pmsync_core::config::ExitMode;
use pmsync_core::report::RunSummary;

/// Turn a finished run into the process result for `mode`.
pub(crate) fn finish(what: &str, summary: &RunSummary, mode: ExitMode) -> anyhow::Result<()> {
    if summary.succeeded(mode) {
        return Ok(());
    }
    anyhow::bail!("{what} finished with {} error(s)", summary.errors)
}

pub(crate) fn exit_mode(strict: bool, configured: ExitMode) -> ExitMode {
    if strict {
        ExitMode::Strict
    } else {
        configured
    }
}
