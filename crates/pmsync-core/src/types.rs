use crate::error::{PmError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// IssueType
// ---------------------------------------------------------------------------

/// Level in the Epic → Task → Subtask hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Epic,
    Task,
    Subtask,
}

impl IssueType {
    pub fn all() -> &'static [IssueType] {
        &[IssueType::Epic, IssueType::Task, IssueType::Subtask]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::Epic => "epic",
            IssueType::Task => "task",
            IssueType::Subtask => "subtask",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IssueType {
    type Err = PmError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "epic" => Ok(IssueType::Epic),
            "task" => Ok(IssueType::Task),
            "subtask" | "sub-task" => Ok(IssueType::Subtask),
            _ => Err(PmError::InvalidIssueType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

/// A roster handle resolved against the tracker's user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub handle: String,
    pub account_id: String,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Issue / NewIssue
// ---------------------------------------------------------------------------

/// An issue as returned by a tracker search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    /// `None` when the tracker reports a type name outside the hierarchy.
    pub issue_type: Option<IssueType>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
}

/// Payload for creating an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub project: String,
    pub issue_type: IssueType,
    pub summary: String,
    pub description: String,
    pub assignee: Option<String>,
    pub parent: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

impl NewIssue {
    pub fn new(
        project: impl Into<String>,
        issue_type: IssueType,
        summary: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            issue_type,
            summary: summary.into(),
            description: description.into(),
            assignee: None,
            parent: None,
            start_date: None,
            due_date: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Per-run inputs that would otherwise come from the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub day: NaiveDate,
}

impl RunContext {
    pub fn new(day: NaiveDate) -> Self {
        Self { day }
    }

    pub fn today() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }

    /// `days` before the run day.
    pub fn days_before(&self, days: u32) -> Result<NaiveDate> {
        self.day
            .checked_sub_days(chrono::Days::new(u64::from(days)))
            .ok_or_else(|| PmError::InvalidDate(format!("{} minus {days} days", self.day)))
    }
}

/// Parse a `YYYY-MM-DD` day string.
pub fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| PmError::InvalidDate(s.to_string()))
}
