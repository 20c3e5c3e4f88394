//! A tracker wrapper that reads through and simulates writes.

use crate::error::Result;
use crate::query::IssueQuery;
use crate::tracker::Tracker;
use crate::types::{Issue, NewIssue, Owner};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use tracing::info;

/// Passes lookups and searches to the inner tracker. Creates and deletes are
/// logged and recorded locally; later searches see their effects so a dry
/// run reports the same actions a real run would.
pub struct DryRunTracker<T: Tracker> {
    inner: T,
    created: RefCell<Vec<Issue>>,
    removed: RefCell<HashSet<String>>,
    next_id: Cell<u32>,
}

impl<T: Tracker> DryRunTracker<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            created: RefCell::new(Vec::new()),
            removed: RefCell::new(HashSet::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn created(&self) -> Vec<Issue> {
        self.created.borrow().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.removed.borrow().iter().cloned().collect();
        keys.sort();
        keys
    }
}

impl<T: Tracker> Tracker for DryRunTracker<T> {
    fn find_user(&self, handle: &str) -> Result<Owner> {
        self.inner.find_user(handle)
    }

    fn search_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>> {
        let removed = self.removed.borrow();
        let mut found: Vec<Issue> = self
            .inner
            .search_issues(query)?
            .into_iter()
            .filter(|i| !removed.contains(&i.key))
            .collect();
        found.extend(
            self.created
                .borrow()
                .iter()
                .filter(|i| !removed.contains(&i.key) && query.matches(i))
                .cloned(),
        );
        Ok(found)
    }

    fn create_issue(&self, issue: &NewIssue) -> Result<Issue> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let simulated = Issue {
            key: format!("{}-DRYRUN{id}", issue.project),
            issue_type: Some(issue.issue_type),
            summary: issue.summary.clone(),
            status: None,
            parent_key: issue.parent.clone(),
        };
        info!(
            key = %simulated.key,
            issue_type = %issue.issue_type,
            summary = %issue.summary,
            parent = issue.parent.as_deref().unwrap_or("-"),
            "dry run: would create"
        );
        self.created.borrow_mut().push(simulated.clone());
        Ok(simulated)
    }

    fn delete_issue(&self, key: &str) -> Result<()> {
        info!(key, "dry run: would delete");
        self.removed.borrow_mut().insert(key.to_string());
        Ok(())
    }
}
