//! Summary and description templates for each hierarchy level.
//!
//! Summaries are the natural key used for find-or-create, so the templates
//! must keep each level's identity: Epic per project, Task per
//! (project, owner), Subtask per (project, owner, day).

use crate::types::IssueType;
use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

const PROJECT: &str = "{project}";
const OWNER: &str = "{owner}";
const DATE: &str = "{date}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPolicy {
    #[serde(default = "default_epic")]
    pub epic: String,
    #[serde(default = "default_task")]
    pub task: String,
    #[serde(default = "default_subtask")]
    pub subtask: String,
    #[serde(default = "default_epic_description")]
    pub epic_description: String,
    #[serde(default = "default_task_description")]
    pub task_description: String,
    #[serde(default = "default_subtask_description")]
    pub subtask_description: String,
    /// strftime pattern used for `{date}`.
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_epic() -> String {
    "PM {project}".to_string()
}

fn default_task() -> String {
    "PM {project} - {owner}".to_string()
}

fn default_subtask() -> String {
    "PM {project} - {owner} - {date}".to_string()
}

fn default_epic_description() -> String {
    "Epic for managing tasks in project {project}".to_string()
}

fn default_task_description() -> String {
    "Task for {owner} in project {project}".to_string()
}

fn default_subtask_description() -> String {
    "Subtask for {owner} on {date} for project {project}".to_string()
}

pub fn default_date_format() -> String {
    "%m.%d.%Y".to_string()
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self {
            epic: default_epic(),
            task: default_task(),
            subtask: default_subtask(),
            epic_description: default_epic_description(),
            task_description: default_task_description(),
            subtask_description: default_subtask_description(),
            date_format: default_date_format(),
        }
    }
}

impl SummaryPolicy {
    pub fn format_day(&self, day: NaiveDate) -> String {
        format_day(day, &self.date_format)
    }

    pub fn epic_summary(&self, project: &str) -> String {
        render(&self.epic, project, "", "")
    }

    pub fn task_summary(&self, project: &str, owner: &str) -> String {
        render(&self.task, project, owner, "")
    }

    pub fn subtask_summary(&self, project: &str, owner: &str, day: NaiveDate) -> String {
        render(&self.subtask, project, owner, &self.format_day(day))
    }

    pub fn description(
        &self,
        issue_type: IssueType,
        project: &str,
        owner: &str,
        day: NaiveDate,
    ) -> String {
        let template = match issue_type {
            IssueType::Epic => &self.epic_description,
            IssueType::Task => &self.task_description,
            IssueType::Subtask => &self.subtask_description,
        };
        render(template, project, owner, &self.format_day(day))
    }

    /// Template mistakes that would break per-level uniqueness.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.epic.contains(PROJECT) {
            out.push("summaries.epic must contain {project}".to_string());
        }
        if self.epic.contains(OWNER) || self.epic.contains(DATE) {
            out.push("summaries.epic is shared per project and cannot use {owner} or {date}".to_string());
        }
        if !self.task.contains(OWNER) {
            out.push("summaries.task must contain {owner}".to_string());
        }
        if self.task.contains(DATE) {
            out.push("summaries.task is shared across days and cannot use {date}".to_string());
        }
        if !self.subtask.contains(OWNER) || !self.subtask.contains(DATE) {
            out.push("summaries.subtask must contain {owner} and {date}".to_string());
        }
        if !is_valid_date_format(&self.date_format) {
            out.push(format!(
                "summaries.date_format '{}' is not a valid strftime pattern",
                self.date_format
            ));
        }
        out
    }
}

/// Substitute placeholders in one pass; substituted values are never rescanned.
fn render(template: &str, project: &str, owner: &str, date: &str) -> String {
    let values = [(PROJECT, project), (OWNER, owner), (DATE, date)];
    let mut out = String::with_capacity(template.len() + project.len() + owner.len() + date.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Format `day` with a strftime pattern, falling back to ISO on a bad pattern.
pub fn format_day(day: NaiveDate, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", day.format(pattern)).is_err() {
        return day.format("%Y-%m-%d").to_string();
    }
    out
}

pub fn is_valid_date_format(pattern: &str) -> bool {
    !pattern.is_empty() && !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}
