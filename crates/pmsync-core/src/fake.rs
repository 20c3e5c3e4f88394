//! In-memory tracker for unit tests. Records every call.

use crate::error::{PmError, Result};
use crate::query::IssueQuery;
use crate::tracker::Tracker;
use crate::types::{Issue, IssueType, NewIssue, Owner};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct FakeTracker {
    pub issues: RefCell<Vec<Issue>>,
    pub users: HashMap<String, Owner>,
    pub created: RefCell<Vec<NewIssue>>,
    pub delete_attempts: RefCell<Vec<String>>,
    pub searches: RefCell<Vec<IssueQuery>>,
    pub user_lookups: RefCell<Vec<String>>,
    /// Keys whose delete returns an error.
    pub fail_deletes: HashSet<String>,
    /// Summaries whose create returns an error.
    pub fail_creates: HashSet<String>,
    /// Parent keys whose child query returns an error.
    pub fail_child_checks: HashSet<String>,
    next_id: Cell<u32>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, handle: &str, account_id: &str, display_name: &str) -> Self {
        self.users.insert(
            handle.to_string(),
            Owner {
                handle: handle.to_string(),
                account_id: account_id.to_string(),
                display_name: display_name.to_string(),
            },
        );
        self
    }

    pub fn seed(
        &self,
        key: &str,
        issue_type: IssueType,
        summary: &str,
        status: &str,
        parent: Option<&str>,
    ) {
        self.issues.borrow_mut().push(Issue {
            key: key.to_string(),
            issue_type: Some(issue_type),
            summary: summary.to_string(),
            status: Some(status.to_string()),
            parent_key: parent.map(str::to_string),
        });
    }

    pub fn get(&self, key: &str) -> Option<Issue> {
        self.issues.borrow().iter().find(|i| i.key == key).cloned()
    }

    pub fn count(&self, issue_type: IssueType) -> usize {
        self.issues
            .borrow()
            .iter()
            .filter(|i| i.issue_type == Some(issue_type))
            .count()
    }
}

impl Tracker for FakeTracker {
    fn find_user(&self, handle: &str) -> Result<Owner> {
        self.user_lookups.borrow_mut().push(handle.to_string());
        self.users
            .get(handle)
            .cloned()
            .ok_or_else(|| PmError::OwnerNotFound(handle.to_string()))
    }

    fn search_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>> {
        self.searches.borrow_mut().push(query.clone());
        if query.parents.iter().any(|p| self.fail_child_checks.contains(p)) {
            return Err(PmError::Tracker {
                status: 503,
                body: "search unavailable".into(),
            });
        }
        Ok(self
            .issues
            .borrow()
            .iter()
            .filter(|i| query.matches(i))
            .cloned()
            .collect())
    }

    fn create_issue(&self, issue: &NewIssue) -> Result<Issue> {
        self.created.borrow_mut().push(issue.clone());
        if self.fail_creates.contains(&issue.summary) {
            return Err(PmError::CreateFailure {
                summary: issue.summary.clone(),
                message: "400 - rejected".into(),
            });
        }
        if let Some(parent) = &issue.parent {
            if self.get(parent).is_none() {
                return Err(PmError::CreateFailure {
                    summary: issue.summary.clone(),
                    message: format!("parent {parent} does not exist"),
                });
            }
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let created = Issue {
            key: format!("{}-{}", issue.project, 100 + id),
            issue_type: Some(issue.issue_type),
            summary: issue.summary.clone(),
            status: Some("To Do".to_string()),
            parent_key: issue.parent.clone(),
        };
        self.issues.borrow_mut().push(created.clone());
        Ok(created)
    }

    fn delete_issue(&self, key: &str) -> Result<()> {
        self.delete_attempts.borrow_mut().push(key.to_string());
        if self.fail_deletes.contains(key) {
            return Err(PmError::DeleteFailure {
                key: key.to_string(),
                status: 403,
                body: "forbidden".into(),
            });
        }
        let mut issues = self.issues.borrow_mut();
        let before = issues.len();
        issues.retain(|i| i.key != key);
        if issues.len() == before {
            return Err(PmError::DeleteFailure {
                key: key.to_string(),
                status: 404,
                body: "not found".into(),
            });
        }
        Ok(())
    }
}
