use crate::config::ExitMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a run did to one issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Reused,
    Deleted,
    Retained,
    Skipped,
    Errored,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Reused => "reused",
            Action::Deleted => "deleted",
            Action::Retained => "retained",
            Action::Skipped => "skipped",
            Action::Errored => "errored",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-action counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub reused: usize,
    pub deleted: usize,
    pub retained: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RunSummary {
    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        let mut s = Self::default();
        for a in actions {
            s.record(a);
        }
        s
    }

    pub fn record(&mut self, action: Action) {
        match action {
            Action::Created => self.created += 1,
            Action::Reused => self.reused += 1,
            Action::Deleted => self.deleted += 1,
            Action::Retained => self.retained += 1,
            Action::Skipped => self.skipped += 1,
            Action::Errored => self.errors += 1,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Whether the process should report success under `mode`.
    pub fn succeeded(&self, mode: ExitMode) -> bool {
        match mode {
            ExitMode::Lenient => true,
            ExitMode::Strict => !self.has_errors(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} reused, {} deleted, {} retained, {} skipped, {} errors",
            self.created, self.reused, self.deleted, self.retained, self.skipped, self.errors
        )
    }
}
