//! Bottom-up deletion of stale hierarchy issues.
//!
//! Subtasks matching the filter are deleted first. Tasks are then deleted
//! only if a fresh child query, issued right before the delete, comes back
//! empty. Epics are never deleted.

use crate::config::{Config, PruneScope};
use crate::error::{PmError, Result};
use crate::query::IssueQuery;
use crate::reconcile::find_existing;
use crate::report::{Action, RunSummary};
use crate::summary::{format_day, SummaryPolicy};
use crate::tracker::Tracker;
use crate::types::{Issue, IssueType, RunContext};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Parent keys per `parent in (...)` query, keeping the request URL bounded.
const PARENT_CHUNK: usize = 50;

/// Which issues a prune run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFilter {
    /// Text that must appear in a Subtask (or flat-scope Task) summary.
    pub date_text: String,
    pub status: Option<String>,
    pub condition: Option<String>,
    pub scope: PruneScope,
    pub projects: Vec<String>,
}

impl IssueFilter {
    pub fn from_config(cfg: &Config, target: NaiveDate, condition: Option<String>) -> Self {
        Self {
            date_text: format_day(target, cfg.prune_date_format()),
            status: cfg.prune.status.clone(),
            condition,
            scope: cfg.prune.scope,
            projects: cfg.prune_projects(),
        }
    }

    fn base(&self, project: &str, issue_type: IssueType) -> IssueQuery {
        IssueQuery::new()
            .project(project)
            .issue_type(issue_type)
            .status(self.status.as_deref())
            .condition(self.condition.as_deref())
    }
}

/// Resolve the day to prune: an explicit date wins, else `days_ago` before the run day.
pub fn target_day(ctx: &RunContext, explicit: Option<NaiveDate>, days_ago: Option<u32>) -> Result<NaiveDate> {
    if let Some(day) = explicit {
        return Ok(day);
    }
    let days = days_ago.ok_or_else(|| {
        PmError::Config("prune.days_ago must be set (or pass --days-ago / --date)".into())
    })?;
    ctx.days_before(days)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneResult {
    pub key: String,
    pub issue_type: Option<IssueType>,
    pub summary: String,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub results: Vec<PruneResult>,
    /// Candidate queries that failed; their issues were left alone.
    pub errors: Vec<String>,
}

impl PruneReport {
    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary::from_actions(self.results.iter().map(|r| r.action));
        s.errors += self.errors.len();
        s
    }

    fn push(&mut self, issue: &Issue, action: Action, detail: Option<String>) {
        self.results.push(PruneResult {
            key: issue.key.clone(),
            issue_type: issue.issue_type,
            summary: issue.summary.clone(),
            action,
            detail,
        });
    }

    fn query_failed(&mut self, project: &str, what: &str, e: &PmError) {
        error!(project, error = %e, "failed to query {what}");
        self.errors.push(format!("{project}: failed to query {what}: {e}"));
    }
}

pub fn prune(tracker: &dyn Tracker, filter: &IssueFilter, summaries: &SummaryPolicy) -> PruneReport {
    let mut report = PruneReport::default();
    for project in &filter.projects {
        info!(project = %project, date = %filter.date_text, scope = ?filter.scope, "pruning");
        prune_project(tracker, filter, summaries, project, &mut report);
    }
    report
}

fn prune_project(
    tracker: &dyn Tracker,
    filter: &IssueFilter,
    summaries: &SummaryPolicy,
    project: &str,
    report: &mut PruneReport,
) {
    let (subtasks, scoped_tasks) = match filter.scope {
        PruneScope::Flat => {
            let query = filter
                .base(project, IssueType::Subtask)
                .summary_contains(&filter.date_text);
            match tracker.search_issues(&query) {
                Ok(found) => (found, None),
                Err(e) => {
                    report.query_failed(project, "subtasks", &e);
                    (Vec::new(), None)
                }
            }
        }
        PruneScope::Hierarchy => match hierarchy_candidates(tracker, filter, summaries, project) {
            Ok(Some((subtasks, tasks))) => (subtasks, Some(tasks)),
            Ok(None) => {
                info!(project, "no epic found; nothing to prune");
                return;
            }
            Err(e) => {
                report.query_failed(project, "hierarchy", &e);
                return;
            }
        },
    };

    info!(project, count = subtasks.len(), date = %filter.date_text, "subtasks to delete");
    for subtask in &subtasks {
        delete_leaf(tracker, subtask, report);
    }

    let tasks = match scoped_tasks {
        Some(tasks) => tasks,
        None => {
            let query = filter
                .base(project, IssueType::Task)
                .summary_contains(&filter.date_text);
            match tracker.search_issues(&query) {
                Ok(found) => found,
                Err(e) => {
                    report.query_failed(project, "tasks", &e);
                    return;
                }
            }
        }
    };

    info!(project, count = tasks.len(), "tasks to check");
    let mut seen = HashSet::new();
    for task in tasks.iter().filter(|t| seen.insert(t.key.clone())) {
        delete_if_empty(tracker, task, report);
    }
}

/// Epic → its Tasks → their Subtasks matching the date. `None` when the project has no Epic.
fn hierarchy_candidates(
    tracker: &dyn Tracker,
    filter: &IssueFilter,
    summaries: &SummaryPolicy,
    project: &str,
) -> Result<Option<(Vec<Issue>, Vec<Issue>)>> {
    let epic_summary = summaries.epic_summary(project);
    let Some(epic) = find_existing(tracker, project, IssueType::Epic, &epic_summary)? else {
        return Ok(None);
    };
    let tasks = tracker.search_issues(&filter.base(project, IssueType::Task).parent(&epic.key))?;
    if tasks.is_empty() {
        return Ok(Some((Vec::new(), tasks)));
    }
    let mut subtasks = Vec::new();
    for chunk in tasks.chunks(PARENT_CHUNK) {
        subtasks.extend(
            tracker.search_issues(
                &filter
                    .base(project, IssueType::Subtask)
                    .summary_contains(&filter.date_text)
                    .parents(chunk.iter().map(|t| t.key.clone())),
            )?,
        );
    }
    Ok(Some((subtasks, tasks)))
}

fn delete_leaf(tracker: &dyn Tracker, subtask: &Issue, report: &mut PruneReport) {
    if !is_deletable(subtask, IssueType::Subtask, report) {
        return;
    }
    delete(tracker, subtask, report);
}

fn delete_if_empty(tracker: &dyn Tracker, task: &Issue, report: &mut PruneReport) {
    if !is_deletable(task, IssueType::Task, report) {
        return;
    }
    if has_children(tracker, &task.key) {
        info!(key = %task.key, "task still has subtasks, not deleting");
        report.push(task, Action::Retained, Some("has children".into()));
        return;
    }
    delete(tracker, task, report);
}

fn is_deletable(issue: &Issue, expected: IssueType, report: &mut PruneReport) -> bool {
    if issue.issue_type == Some(expected) {
        return true;
    }
    let actual = issue
        .issue_type
        .map(|t| t.to_string())
        .unwrap_or_else(|| "unknown".into());
    warn!(key = %issue.key, %expected, %actual, "candidate has unexpected type; not deleting");
    report.push(
        issue,
        Action::Skipped,
        Some(format!("expected {expected}, found {actual}")),
    );
    false
}

/// Fresh child query. An inconclusive answer counts as "has children".
fn has_children(tracker: &dyn Tracker, key: &str) -> bool {
    match tracker.search_issues(&IssueQuery::new().parent(key)) {
        Ok(children) => !children.is_empty(),
        Err(e) => {
            warn!(key, error = %e, "child check failed; keeping task");
            true
        }
    }
}

fn delete(tracker: &dyn Tracker, issue: &Issue, report: &mut PruneReport) {
    match tracker.delete_issue(&issue.key) {
        Ok(()) => {
            info!(key = %issue.key, summary = %issue.summary, "deleted");
            report.push(issue, Action::Deleted, None);
        }
        Err(e) => {
            error!(key = %issue.key, error = %e, "failed to delete");
            report.push(issue, Action::Errored, Some(e.to_string()));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
