//! Issue tracker contract and its Jira Cloud REST v3 implementation.

use crate::config::{DateFields, IssueTypeNames, TrackerConfig};
use crate::error::{PmError, Result};
use crate::query::IssueQuery;
use crate::types::{Issue, NewIssue, Owner};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

const SEARCH_FIELDS: &str = "summary,issuetype,status,parent";

/// Operations the Reconciler and Pruner need from an issue tracker.
pub trait Tracker {
    /// Resolve a roster handle. Takes the first match; `OwnerNotFound` on none.
    fn find_user(&self, handle: &str) -> Result<Owner>;

    fn search_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>>;

    fn create_issue(&self, issue: &NewIssue) -> Result<Issue>;

    /// Succeeds only on an explicit no-content acknowledgment.
    fn delete_issue(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    account_id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    issues: Vec<IssueDto>,
    #[serde(default)]
    total: Option<usize>,
}

#[derive(Deserialize)]
struct IssueDto {
    key: String,
    #[serde(default)]
    fields: FieldsDto,
}

#[derive(Deserialize, Default)]
struct FieldsDto {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    issuetype: Option<NamedDto>,
    #[serde(default)]
    status: Option<NamedDto>,
    #[serde(default)]
    parent: Option<KeyDto>,
}

#[derive(Deserialize)]
struct NamedDto {
    name: String,
}

#[derive(Deserialize)]
struct KeyDto {
    key: String,
}

// ---------------------------------------------------------------------------
// JiraClient
// ---------------------------------------------------------------------------

pub struct JiraClient {
    http: Client,
    base_url: String,
    username: String,
    token: String,
    page_size: u32,
    types: IssueTypeNames,
    date_fields: Option<DateFields>,
}

impl JiraClient {
    pub fn new(cfg: &TrackerConfig) -> Result<Self> {
        let username = cfg
            .username
            .clone()
            .ok_or_else(|| PmError::Config("tracker.username is required".into()))?;
        let token = cfg
            .token
            .clone()
            .ok_or_else(|| PmError::Config("tracker.token is required".into()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("pmsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            username,
            token,
            page_size: cfg.page_size.clamp(1, 100),
            types: cfg.issue_types.clone(),
            date_fields: cfg.date_fields.clone(),
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .basic_auth(&self.username, Some(&self.token))
            .header(ACCEPT, "application/json")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn create_body(&self, issue: &NewIssue) -> Result<Value> {
        let mut fields = Map::new();
        fields.insert("project".into(), json!({ "key": issue.project }));
        fields.insert("summary".into(), json!(issue.summary));
        fields.insert("description".into(), adf_paragraph(&issue.description));
        fields.insert(
            "issuetype".into(),
            json!({ "name": self.types.name_for(issue.issue_type) }),
        );
        if let Some(account_id) = &issue.assignee {
            fields.insert("assignee".into(), json!({ "accountId": account_id }));
        }
        if let Some(parent) = &issue.parent {
            fields.insert("parent".into(), json!({ "key": parent }));
        }
        if issue.start_date.is_some() || issue.due_date.is_some() {
            let date_fields = self.date_fields.as_ref().ok_or_else(|| PmError::CreateFailure {
                summary: issue.summary.clone(),
                message: "date values given but tracker.date_fields is not configured".into(),
            })?;
            if let Some(start) = issue.start_date {
                fields.insert(date_fields.start_key(), json!(start.format("%Y-%m-%d").to_string()));
            }
            if let Some(due) = issue.due_date {
                fields.insert(date_fields.due_key(), json!(due.format("%Y-%m-%d").to_string()));
            }
        }
        Ok(json!({ "fields": fields }))
    }

    fn to_issue(&self, dto: IssueDto) -> Issue {
        let issue_type = dto
            .fields
            .issuetype
            .as_ref()
            .and_then(|t| self.types.type_for(&t.name));
        Issue {
            key: dto.key,
            issue_type,
            summary: dto.fields.summary.unwrap_or_default(),
            status: dto.fields.status.map(|s| s.name),
            parent_key: dto.fields.parent.map(|p| p.key),
        }
    }
}

/// Wrap plain text as a single-paragraph Atlassian Document Format node.
fn adf_paragraph(text: &str) -> Value {
    let content = if text.is_empty() {
        json!([])
    } else {
        json!([{ "type": "text", "text": text }])
    };
    json!({
        "version": 1,
        "type": "doc",
        "content": [{ "type": "paragraph", "content": content }],
    })
}

fn error_status(response: Response) -> PmError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    PmError::Tracker { status, body }
}

impl Tracker for JiraClient {
    fn find_user(&self, handle: &str) -> Result<Owner> {
        let response = self
            .request(self.http.get(self.url("/rest/api/3/user/search")))
            .query(&[("query", handle)])
            .send()?;
        if !response.status().is_success() {
            return Err(error_status(response));
        }
        let users: Vec<UserDto> = response.json()?;
        if users.len() > 1 {
            warn!(handle, matches = users.len(), "user lookup is ambiguous; using first match");
        }
        let user = users
            .into_iter()
            .next()
            .ok_or_else(|| PmError::OwnerNotFound(handle.to_string()))?;
        Ok(Owner {
            handle: handle.to_string(),
            display_name: user.display_name.unwrap_or_else(|| handle.to_string()),
            account_id: user.account_id,
        })
    }

    fn search_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>> {
        let jql = query.to_jql(&self.types);
        debug!(%jql, "searching issues");
        let max_results = self.page_size.to_string();
        let mut issues = Vec::new();
        loop {
            let start_at = issues.len().to_string();
            let response = self
                .request(self.http.get(self.url("/rest/api/3/search")))
                .query(&[
                    ("jql", jql.as_str()),
                    ("fields", SEARCH_FIELDS),
                    ("startAt", start_at.as_str()),
                    ("maxResults", max_results.as_str()),
                ])
                .send()?;
            if !response.status().is_success() {
                return Err(error_status(response));
            }
            let page: SearchPage = response.json()?;
            let fetched = page.issues.len();
            issues.extend(page.issues.into_iter().map(|dto| self.to_issue(dto)));
            let done = match page.total {
                Some(total) => issues.len() >= total,
                None => fetched < self.page_size as usize,
            };
            if fetched == 0 || done {
                break;
            }
        }
        Ok(issues)
    }

    fn create_issue(&self, issue: &NewIssue) -> Result<Issue> {
        let body = self.create_body(issue)?;
        let response = self
            .request(self.http.post(self.url("/rest/api/3/issue")))
            .json(&body)
            .send()?;
        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(PmError::CreateFailure {
                summary: issue.summary.clone(),
                message: format!("{} - {}", status.as_u16(), text),
            });
        }
        let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let key = value
            .get("key")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PmError::CreateFailure {
                summary: issue.summary.clone(),
                message: format!("response has no issue key: {text}"),
            })?;
        Ok(Issue {
            key: key.to_string(),
            issue_type: Some(issue.issue_type),
            summary: issue.summary.clone(),
            status: None,
            parent_key: issue.parent.clone(),
        })
    }

    fn delete_issue(&self, key: &str) -> Result<()> {
        let response = self
            .request(self.http.delete(self.url(&format!("/rest/api/3/issue/{key}"))))
            .send()?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(());
        }
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        Err(PmError::DeleteFailure {
            key: key.to_string(),
            status,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IssueType;
    use chrono::NaiveDate;
    use mockito::Matcher;

    fn client(url: &str) -> JiraClient {
        let cfg = TrackerConfig {
            base_url: format!("{url}/"),
            username: Some("bot@example.com".into()),
            token: Some("tok".into()),
            page_size: 2,
            date_fields: Some(DateFields {
                start: "10015".into(),
                due: "10016".into(),
            }),
            ..TrackerConfig::default()
        };
        JiraClient::new(&cfg).unwrap()
    }

    #[test]
    fn find_user_takes_first_match() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/rest/api/3/user/search")
            .match_query(Matcher::UrlEncoded("query".into(), "alice@x.com".into()))
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"accountId":"acc-1","displayName":"Alice"},{"accountId":"acc-2","displayName":"Alice B"}]"#,
            )
            .create();

        let owner = client(&server.url()).find_user("alice@x.com").unwrap();
        mock.assert();
        assert_eq!(owner.account_id, "acc-1");
        assert_eq!(owner.display_name, "Alice");
        assert_eq!(owner.handle, "alice@x.com");
    }

    #[test]
    fn find_user_empty_is_owner_not_found() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/rest/api/3/user/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create();

        let err = client(&server.url()).find_user("ghost@x.com").unwrap_err();
        assert!(matches!(err, PmError::OwnerNotFound(h) if h == "ghost@x.com"));
    }

    #[test]
    fn search_follows_pages() {
        let mut server = mockito::Server::new();
        let first = server
            .mock("GET", "/rest/api/3/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("startAt".into(), "0".into()),
                Matcher::UrlEncoded("maxResults".into(), "2".into()),
                Matcher::UrlEncoded(
                    "jql".into(),
                    r#"project = "PRJ1" AND issuetype = "Subtask" ORDER BY key ASC"#.into(),
                ),
            ]))
            .with_status(200)
            .with_body(
                r#"{"total":3,"issues":[
                    {"key":"PRJ1-3","fields":{"summary":"a","issuetype":{"name":"Subtask"},"status":{"name":"To Do"},"parent":{"key":"PRJ1-2"}}},
                    {"key":"PRJ1-4","fields":{"summary":"b","issuetype":{"name":"Subtask"},"status":{"name":"Done"},"parent":{"key":"PRJ1-2"}}}
                ]}"#,
            )
            .create();
        let second = server
            .mock("GET", "/rest/api/3/search")
            .match_query(Matcher::UrlEncoded("startAt".into(), "2".into()))
            .with_status(200)
            .with_body(
                r#"{"total":3,"issues":[{"key":"PRJ1-5","fields":{"summary":"c","issuetype":{"name":"Story"}}}]}"#,
            )
            .create();

        let query = IssueQuery::new().project("PRJ1").issue_type(IssueType::Subtask);
        let issues = client(&server.url()).search_issues(&query).unwrap();
        first.assert();
        second.assert();
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].issue_type, Some(IssueType::Subtask));
        assert_eq!(issues[0].status.as_deref(), Some("To Do"));
        assert_eq!(issues[1].parent_key.as_deref(), Some("PRJ1-2"));
        assert_eq!(issues[2].issue_type, None);
    }

    #[test]
    fn search_error_status_is_reported() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/rest/api/3/search")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"errorMessages":["bad jql"]}"#)
            .create();

        let err = client(&server.url())
            .search_issues(&IssueQuery::new().project("PRJ1"))
            .unwrap_err();
        assert!(matches!(err, PmError::Tracker { status: 400, ref body } if body.contains("bad jql")));
    }

    #[test]
    fn create_subtask_sends_hierarchy_and_dates() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/rest/api/3/issue")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "fields": {
                    "project": { "key": "PRJ1" },
                    "summary": "PM PRJ1 - Alice - 01.10.2024",
                    "issuetype": { "name": "Subtask" },
                    "assignee": { "accountId": "acc-1" },
                    "parent": { "key": "PRJ1-2" },
                    "customfield_10015": "2024-01-10",
                    "customfield_10016": "2024-01-10",
                    "description": { "type": "doc", "version": 1 }
                }
            })))
            .with_status(201)
            .with_body(r#"{"id":"10003","key":"PRJ1-3","self":"x"}"#)
            .create();

        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let mut new = NewIssue::new("PRJ1", IssueType::Subtask, "PM PRJ1 - Alice - 01.10.2024", "d");
        new.assignee = Some("acc-1".into());
        new.parent = Some("PRJ1-2".into());
        new.start_date = Some(day);
        new.due_date = Some(day);

        let created = client(&server.url()).create_issue(&new).unwrap();
        mock.assert();
        assert_eq!(created.key, "PRJ1-3");
        assert_eq!(created.parent_key.as_deref(), Some("PRJ1-2"));
    }

    #[test]
    fn create_rejection_keeps_raw_response() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/rest/api/3/issue")
            .with_status(400)
            .with_body(r#"{"errors":{"parent":"invalid"}}"#)
            .create();

        let new = NewIssue::new("PRJ1", IssueType::Task, "PM PRJ1 - Alice", "d");
        let err = client(&server.url()).create_issue(&new).unwrap_err();
        match err {
            PmError::CreateFailure { summary, message } => {
                assert_eq!(summary, "PM PRJ1 - Alice");
                assert!(message.starts_with("400"));
                assert!(message.contains("invalid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn create_without_key_is_a_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/rest/api/3/issue")
            .with_status(200)
            .with_body(r#"{"id":"1"}"#)
            .create();

        let new = NewIssue::new("PRJ1", IssueType::Epic, "PM PRJ1", "d");
        let err = client(&server.url()).create_issue(&new).unwrap_err();
        assert!(matches!(err, PmError::CreateFailure { .. }));
    }

    #[test]
    fn delete_requires_no_content() {
        let mut server = mockito::Server::new();
        server
            .mock("DELETE", "/rest/api/3/issue/PRJ1-3")
            .with_status(204)
            .create();
        server
            .mock("DELETE", "/rest/api/3/issue/PRJ1-4")
            .with_status(200)
            .with_body("ok")
            .create();
        server
            .mock("DELETE", "/rest/api/3/issue/PRJ1-5")
            .with_status(403)
            .with_body("forbidden")
            .create();

        let c = client(&server.url());
        c.delete_issue("PRJ1-3").unwrap();
        assert!(matches!(
            c.delete_issue("PRJ1-4"),
            Err(PmError::DeleteFailure { status: 200, .. })
        ));
        match c.delete_issue("PRJ1-5").unwrap_err() {
            PmError::DeleteFailure { key, status, body } => {
                assert_eq!(key, "PRJ1-5");
                assert_eq!(status, 403);
                assert_eq!(body, "forbidden");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn adf_paragraph_omits_empty_text() {
        let empty = adf_paragraph("");
        assert_eq!(empty["content"][0]["content"], serde_json::json!([]));
        let text = adf_paragraph("hello");
        assert_eq!(text["content"][0]["content"][0]["text"], "hello");
    }
}
