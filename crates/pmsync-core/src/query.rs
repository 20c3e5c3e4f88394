//! Structured issue filters rendered to JQL.
//!
//! Every caller-supplied value (project codes, summaries, statuses, parent
//! keys) is quoted and escaped. The free-form `condition` clause is the one
//! exception: it comes from the operator and is appended verbatim inside
//! parentheses.

use crate::config::IssueTypeNames;
use crate::types::{Issue, IssueType};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueQuery {
    pub project: Option<String>,
    pub issue_type: Option<IssueType>,
    pub summary_phrase: Option<String>,
    pub status: Option<String>,
    pub parents: Vec<String>,
    pub condition: Option<String>,
}

impl IssueQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn issue_type(mut self, issue_type: IssueType) -> Self {
        self.issue_type = Some(issue_type);
        self
    }

    pub fn summary_contains(mut self, phrase: impl Into<String>) -> Self {
        self.summary_phrase = Some(phrase.into());
        self
    }

    pub fn status(mut self, status: Option<&str>) -> Self {
        self.status = status.map(str::to_string);
        self
    }

    pub fn parent(mut self, key: impl Into<String>) -> Self {
        self.parents.push(key.into());
        self
    }

    pub fn parents<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn condition(mut self, condition: Option<&str>) -> Self {
        self.condition = condition
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self
    }

    /// Evaluate the filter against an issue held locally.
    ///
    /// Projects match by key prefix and summaries by case-insensitive
    /// substring. The free-form condition cannot be evaluated and is ignored.
    pub fn matches(&self, issue: &Issue) -> bool {
        if let Some(project) = &self.project {
            let prefix = format!("{}-", project.to_ascii_uppercase());
            if !issue.key.to_ascii_uppercase().starts_with(&prefix) {
                return false;
            }
        }
        if let Some(issue_type) = self.issue_type {
            if issue.issue_type != Some(issue_type) {
                return false;
            }
        }
        if let Some(phrase) = &self.summary_phrase {
            if !issue.summary.to_lowercase().contains(&phrase.to_lowercase()) {
                return false;
            }
        }
        if let Some(status) = &self.status {
            match &issue.status {
                Some(s) if s.eq_ignore_ascii_case(status) => {}
                _ => return false,
            }
        }
        if !self.parents.is_empty() {
            match &issue.parent_key {
                Some(p) if self.parents.contains(p) => {}
                _ => return false,
            }
        }
        true
    }

    /// Render as a JQL string, mapping hierarchy levels to tracker type names.
    pub fn to_jql(&self, names: &IssueTypeNames) -> String {
        let mut clauses = Vec::new();

        if let Some(project) = &self.project {
            clauses.push(format!("project = {}", quote(project)));
        }
        if let Some(issue_type) = self.issue_type {
            clauses.push(format!("issuetype = {}", quote(names.name_for(issue_type))));
        }
        if let Some(phrase) = &self.summary_phrase {
            clauses.push(format!("summary ~ \"\\\"{}\\\"\"", sanitize_phrase(phrase)));
        }
        if let Some(status) = &self.status {
            clauses.push(format!("status = {}", quote(status)));
        }
        match self.parents.as_slice() {
            [] => {}
            [one] => clauses.push(format!("parent = {}", quote(one))),
            many => {
                let keys: Vec<String> = many.iter().map(|k| quote(k)).collect();
                clauses.push(format!("parent in ({})", keys.join(", ")));
            }
        }
        if let Some(condition) = &self.condition {
            clauses.push(format!("({condition})"));
        }

        let mut jql = clauses.join(" AND ");
        if !jql.is_empty() {
            jql.push(' ');
        }
        jql.push_str("ORDER BY key ASC");
        jql
    }
}

/// Quote a value as a JQL string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' | '\t' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

static ORDER_BY_RE: OnceLock<Regex> = OnceLock::new();

fn order_by_re() -> &'static Regex {
    ORDER_BY_RE.get_or_init(|| Regex::new(r"(?i)\border\s+by\b").unwrap())
}

/// Check that a free-form condition stays inside the parentheses it is
/// wrapped in: parentheses balance outside string literals, every literal
/// is closed, and there is no `ORDER BY`.
pub fn check_condition(condition: &str) -> Result<(), String> {
    let mut outside = String::with_capacity(condition.len());
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in condition.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            outside.push(' ');
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err("has a ')' without a matching '('".into());
                }
            }
            _ => {}
        }
        outside.push(c);
    }

    if quote.is_some() {
        return Err("has an unterminated string literal".into());
    }
    if depth != 0 {
        return Err("has a '(' without a matching ')'".into());
    }
    if order_by_re().is_match(&outside) {
        return Err("must be a filter clause without ORDER BY".into());
    }
    Ok(())
}

/// Make text safe to embed as an exact-phrase search inside a JQL literal.
///
/// Quotes and backslashes cannot be represented inside the nested phrase, so
/// they become spaces; the text index ignores punctuation anyway.
fn sanitize_phrase(phrase: &str) -> String {
    let replaced: String = phrase
        .chars()
        .map(|c| if matches!(c, '"' | '\\') || c.is_control() { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}
