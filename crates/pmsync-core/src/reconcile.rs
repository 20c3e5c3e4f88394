//! Find-or-create of the Epic → Task → Subtask chain per (owner, project, day).

use crate::config::Config;
use crate::directory::Directory;
use crate::error::Result;
use crate::query::IssueQuery;
use crate::report::{Action, RunSummary};
use crate::summary::SummaryPolicy;
use crate::tracker::Tracker;
use crate::types::{Issue, IssueType, NewIssue, Owner, RunContext};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct ReconcileOptions<'a> {
    pub summaries: &'a SummaryPolicy,
    /// Set Subtask start/due dates to the run day.
    pub subtask_dates: bool,
}

impl<'a> ReconcileOptions<'a> {
    pub fn from_config(cfg: &'a Config) -> Self {
        Self {
            summaries: &cfg.summaries,
            subtask_dates: cfg.reconcile.subtask_dates,
        }
    }
}

/// One level of one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub issue_type: IssueType,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub summary: String,
}

/// Outcome of one (owner, project) branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileResult {
    pub owner: String,
    pub project: String,
    pub steps: Vec<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconcileResult {
    fn new(owner: &str, project: &str) -> Self {
        Self {
            owner: owner.to_string(),
            project: project.to_string(),
            steps: Vec::new(),
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub fn summarize(results: &[ReconcileResult]) -> RunSummary {
    let mut summary = RunSummary::from_actions(results.iter().flat_map(|r| r.steps.iter().map(|s| s.action)));
    // Owner lookups fail before any step is recorded.
    summary.errors += results
        .iter()
        .filter(|r| r.is_error() && !r.steps.iter().any(|s| s.action == Action::Errored))
        .count();
    summary
}

/// Ensure every (owner, project) branch in `directory` exists for `ctx.day`.
///
/// Failures are isolated: an unknown owner skips that owner's projects, a
/// failed search or create skips the rest of that project's branch.
pub fn reconcile(
    tracker: &dyn Tracker,
    directory: &Directory,
    ctx: &RunContext,
    opts: &ReconcileOptions<'_>,
) -> Vec<ReconcileResult> {
    let mut owners: HashMap<&str, std::result::Result<Owner, String>> = HashMap::new();
    let mut results = Vec::new();

    for assignment in &directory.assignments {
        let handle = assignment.owner.as_str();
        let resolved = owners
            .entry(handle)
            .or_insert_with(|| tracker.find_user(handle).map_err(|e| e.to_string()));

        let owner = match resolved {
            Ok(owner) => owner.clone(),
            Err(e) => {
                error!(owner = handle, error = %e, "owner lookup failed; skipping owner");
                for project in &assignment.projects {
                    let mut result = ReconcileResult::new(handle, project);
                    result.error = Some(e.clone());
                    results.push(result);
                }
                continue;
            }
        };

        for project in &assignment.projects {
            info!(owner = handle, project = %project, "processing project");
            results.push(reconcile_project(tracker, &owner, project, ctx, opts));
        }
    }
    results
}

fn reconcile_project(
    tracker: &dyn Tracker,
    owner: &Owner,
    project: &str,
    ctx: &RunContext,
    opts: &ReconcileOptions<'_>,
) -> ReconcileResult {
    let mut result = ReconcileResult::new(&owner.handle, project);
    if let Err(e) = ensure_chain(tracker, owner, project, ctx, opts, &mut result.steps) {
        error!(owner = %owner.handle, project, error = %e, "branch aborted");
        result.error = Some(e.to_string());
    }
    result
}

fn ensure_chain(
    tracker: &dyn Tracker,
    owner: &Owner,
    project: &str,
    ctx: &RunContext,
    opts: &ReconcileOptions<'_>,
    steps: &mut Vec<Step>,
) -> Result<()> {
    let s = opts.summaries;
    let name = owner.display_name.as_str();

    let epic = NewIssue::new(
        project,
        IssueType::Epic,
        s.epic_summary(project),
        s.description(IssueType::Epic, project, name, ctx.day),
    );
    let epic_key = record(steps, &epic, ensure_issue(tracker, &epic))?;

    let mut task = NewIssue::new(
        project,
        IssueType::Task,
        s.task_summary(project, name),
        s.description(IssueType::Task, project, name, ctx.day),
    );
    task.assignee = Some(owner.account_id.clone());
    task.parent = Some(epic_key);
    let task_key = record(steps, &task, ensure_issue(tracker, &task))?;

    let mut subtask = NewIssue::new(
        project,
        IssueType::Subtask,
        s.subtask_summary(project, name, ctx.day),
        s.description(IssueType::Subtask, project, name, ctx.day),
    );
    subtask.assignee = Some(owner.account_id.clone());
    subtask.parent = Some(task_key);
    if opts.subtask_dates {
        subtask.start_date = Some(ctx.day);
        subtask.due_date = Some(ctx.day);
    }
    record(steps, &subtask, ensure_issue(tracker, &subtask))?;
    Ok(())
}

fn record(steps: &mut Vec<Step>, issue: &NewIssue, outcome: Result<(Action, String)>) -> Result<String> {
    match outcome {
        Ok((action, key)) => {
            steps.push(Step {
                issue_type: issue.issue_type,
                action,
                key: Some(key.clone()),
                summary: issue.summary.clone(),
            });
            Ok(key)
        }
        Err(e) => {
            steps.push(Step {
                issue_type: issue.issue_type,
                action: Action::Errored,
                key: None,
                summary: issue.summary.clone(),
            });
            Err(e)
        }
    }
}

/// Reuse the issue whose summary matches exactly, otherwise create it.
pub fn ensure_issue(tracker: &dyn Tracker, issue: &NewIssue) -> Result<(Action, String)> {
    if let Some(existing) = find_existing(tracker, &issue.project, issue.issue_type, &issue.summary)? {
        info!(
            issue_type = %issue.issue_type,
            key = %existing.key,
            summary = %issue.summary,
            "already exists"
        );
        return Ok((Action::Reused, existing.key));
    }
    let created = tracker.create_issue(issue)?;
    info!(
        issue_type = %issue.issue_type,
        key = %created.key,
        summary = %issue.summary,
        parent = issue.parent.as_deref().unwrap_or("-"),
        "created"
    );
    Ok((Action::Created, created.key))
}

/// Search by (project, type, summary) and keep only an exact summary match.
///
/// Text search matches phrases, so "PM X - Al" also hits "PM X - Al Smith";
/// those near misses are not treated as the issue we are looking for.
pub fn find_existing(
    tracker: &dyn Tracker,
    project: &str,
    issue_type: IssueType,
    summary: &str,
) -> Result<Option<Issue>> {
    let query = IssueQuery::new()
        .project(project)
        .issue_type(issue_type)
        .summary_contains(summary);
    let hits = tracker.search_issues(&query)?;
    let total = hits.len();
    let exact = hits
        .into_iter()
        .find(|i| i.summary.trim() == summary.trim() && i.issue_type == Some(issue_type));
    debug!(project, %issue_type, summary, hits = total, found = exact.is_some(), "checked for existing issue");
    Ok(exact)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
