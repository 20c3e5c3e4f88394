//! Owner → projects roster, read from a spreadsheet.
//!
//! Row layout: column 0 is the owner handle, column 1 a comma-separated
//! list of project codes.

use crate::config::{is_valid_project_code, Config, DirectoryConfig};
use crate::error::{PmError, Result};
use crate::query::check_condition;
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

/// Tabular store holding the roster and the prune condition.
pub trait DirectorySource {
    fn read_rows(&self, source_id: &str, range: &str) -> Result<Vec<Vec<String>>>;

    fn read_cell(&self, source_id: &str, cell: &str) -> Result<String> {
        let rows = self.read_rows(source_id, cell)?;
        rows.into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PmError::SourceRead(format!("cell {cell} is empty")))
    }
}

// ---------------------------------------------------------------------------
// SheetsClient
// ---------------------------------------------------------------------------

/// Google Sheets values API, authenticated with an API key.
pub struct SheetsClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetsClient {
    pub fn new(cfg: &DirectoryConfig, timeout_secs: u64) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| PmError::Config("directory.api_key is required".into()))?;
        let base_url = Url::parse(&cfg.base_url).map_err(|e| {
            PmError::Config(format!("directory.base_url '{}' is invalid: {e}", cfg.base_url))
        })?;
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn values_url(&self, source_id: &str, range: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PmError::Config("directory.base_url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", source_id, "values", range]);
        Ok(url)
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl DirectorySource for SheetsClient {
    fn read_rows(&self, source_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(source_id, range)?;
        let response = self
            .http
            .get(url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .map_err(|e| PmError::SourceRead(format!("spreadsheet request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(PmError::SourceRead(format!(
                "spreadsheet returned {}: {body}",
                status.as_u16()
            )));
        }
        let range: ValueRange = response
            .json()
            .map_err(|e| PmError::SourceRead(format!("spreadsheet response is malformed: {e}")))?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub owner: String,
    pub projects: Vec<String>,
}

/// Owners in first-seen order, each with a de-duplicated project list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Directory {
    pub assignments: Vec<Assignment>,
}

impl Directory {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn project_count(&self) -> usize {
        self.assignments.iter().map(|a| a.projects.len()).sum()
    }

    /// Add projects for `owner`, merging with an earlier row for the same owner.
    pub fn assign(&mut self, owner: &str, projects: impl IntoIterator<Item = String>) {
        let idx = match self.assignments.iter().position(|a| a.owner == owner) {
            Some(i) => i,
            None => {
                self.assignments.push(Assignment {
                    owner: owner.to_string(),
                    projects: Vec::new(),
                });
                self.assignments.len() - 1
            }
        };
        let entry = &mut self.assignments[idx];
        for p in projects {
            if !entry.projects.contains(&p) {
                entry.projects.push(p);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions<'a> {
    pub skip_header: bool,
    pub default_project: Option<&'a str>,
}

pub fn parse_directory(rows: &[Vec<String>], opts: &ParseOptions<'_>) -> Directory {
    let mut directory = Directory::default();
    let skip = usize::from(opts.skip_header);
    for (i, row) in rows.iter().enumerate().skip(skip) {
        let line = i + 1;
        let owner = row.first().map(|s| s.trim()).unwrap_or_default();
        if owner.is_empty() {
            if row.iter().any(|c| !c.trim().is_empty()) {
                warn!(row = line, "roster row has no owner; skipping");
            }
            continue;
        }

        let cell = row.get(1).map(String::as_str).unwrap_or_default();
        let mut projects = Vec::new();
        let mut listed = 0;
        for code in cell.split(',').map(str::trim) {
            if code.is_empty() {
                continue;
            }
            listed += 1;
            if is_valid_project_code(code) {
                projects.push(code.to_string());
            } else {
                error!(row = line, owner, project = code, "project code is invalid; skipping");
            }
        }

        if projects.is_empty() && listed > 0 {
            error!(row = line, owner, "roster row lists no valid project codes; skipping");
            continue;
        }
        if projects.is_empty() {
            match opts.default_project {
                Some(fallback) => projects.push(fallback.to_string()),
                None => {
                    warn!(row = line, owner, "roster row has no projects; skipping");
                    continue;
                }
            }
        }
        directory.assign(owner, projects);
    }
    directory
}

/// Read and parse the roster. An unreadable or empty roster is fatal.
pub fn load_directory(source: &dyn DirectorySource, cfg: &Config) -> Result<Directory> {
    let sheet = cfg
        .directory
        .spreadsheet_id
        .as_deref()
        .ok_or_else(|| PmError::Config("directory.spreadsheet_id is required".into()))?;
    let rows = source.read_rows(sheet, &cfg.directory.range)?;
    if rows.is_empty() {
        return Err(PmError::SourceRead(format!(
            "no data found in {sheet} range {}",
            cfg.directory.range
        )));
    }
    let directory = parse_directory(
        &rows,
        &ParseOptions {
            skip_header: cfg.directory.skip_header,
            default_project: cfg.tracker.default_project.as_deref(),
        },
    );
    if directory.is_empty() {
        return Err(PmError::SourceRead(format!(
            "{sheet} range {} has no usable roster rows",
            cfg.directory.range
        )));
    }
    info!(
        owners = directory.assignments.len(),
        projects = directory.project_count(),
        "loaded roster"
    );
    Ok(directory)
}

/// The prune condition clause: a literal from config or a spreadsheet cell.
///
/// Either way the clause must pass [`check_condition`] before it reaches a query.
pub fn load_condition(source: Option<&dyn DirectorySource>, cfg: &Config) -> Result<Option<String>> {
    if let Some(condition) = &cfg.prune.condition {
        checked(condition, "prune.condition")?;
        return Ok(Some(condition.clone()));
    }
    let Some(cell) = &cfg.prune.condition_cell else {
        return Ok(None);
    };
    let source = source.ok_or_else(|| {
        PmError::Config("prune.condition_cell needs directory settings".into())
    })?;
    let sheet = cfg
        .directory
        .spreadsheet_id
        .as_deref()
        .ok_or_else(|| PmError::Config("directory.spreadsheet_id is required".into()))?;
    let condition = source.read_cell(sheet, cell)?;
    checked(&condition, &format!("condition in cell {cell}"))?;
    info!(cell = %cell, condition = %condition, "loaded prune condition");
    Ok(Some(condition))
}

fn checked(condition: &str, origin: &str) -> Result<()> {
    check_condition(condition).map_err(|reason| PmError::Config(format!("{origin} {reason}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
