use crate::error::{PmError, Result};
use crate::query::check_condition;
use crate::summary::{is_valid_date_format, SummaryPolicy};
use crate::types::IssueType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_CONFIG_FILE: &str = "pmsync.yaml";

const REDACTED: &str = "********";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// IssueTypeNames / DateFields
// ---------------------------------------------------------------------------

/// Tracker-side names of the three hierarchy levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTypeNames {
    #[serde(default = "default_epic_name")]
    pub epic: String,
    #[serde(default = "default_task_name")]
    pub task: String,
    #[serde(default = "default_subtask_name")]
    pub subtask: String,
}

fn default_epic_name() -> String {
    "Epic".to_string()
}

fn default_task_name() -> String {
    "Task".to_string()
}

fn default_subtask_name() -> String {
    "Subtask".to_string()
}

impl Default for IssueTypeNames {
    fn default() -> Self {
        Self {
            epic: default_epic_name(),
            task: default_task_name(),
            subtask: default_subtask_name(),
        }
    }
}

impl IssueTypeNames {
    pub fn name_for(&self, issue_type: IssueType) -> &str {
        match issue_type {
            IssueType::Epic => &self.epic,
            IssueType::Task => &self.task,
            IssueType::Subtask => &self.subtask,
        }
    }

    pub fn type_for(&self, name: &str) -> Option<IssueType> {
        IssueType::all()
            .iter()
            .copied()
            .find(|t| self.name_for(*t).eq_ignore_ascii_case(name))
    }
}

/// Custom field ids for the Subtask start/due dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFields {
    pub start: String,
    pub due: String,
}

impl DateFields {
    pub fn start_key(&self) -> String {
        field_key(&self.start)
    }

    pub fn due_key(&self) -> String {
        field_key(&self.due)
    }
}

/// Accepts either a bare id (`10015`) or a full key (`customfield_10015`).
fn field_key(id: &str) -> String {
    let id = id.trim();
    if id.starts_with("customfield_") {
        id.to_string()
    } else {
        format!("customfield_{id}")
    }
}

// ---------------------------------------------------------------------------
// TrackerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Used for roster rows without projects and as the prune scope fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_project: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub issue_types: IssueTypeNames,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_fields: Option<DateFields>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    50
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: None,
            token: None,
            default_project: None,
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            issue_types: IssueTypeNames::default(),
            date_fields: None,
        }
    }
}

// ---------------------------------------------------------------------------
// DirectoryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(default = "default_range")]
    pub range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_skip_header")]
    pub skip_header: bool,
    #[serde(default = "default_sheets_url")]
    pub base_url: String,
}

fn default_range() -> String {
    "Sheet1".to_string()
}

fn default_skip_header() -> bool {
    true
}

fn default_sheets_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            range: default_range(),
            api_key: None,
            skip_header: default_skip_header(),
            base_url: default_sheets_url(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReconcileConfig / PruneConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Set the start/due custom fields on Subtasks to the run day.
    #[serde(default)]
    pub subtask_dates: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneScope {
    /// Match issues anywhere in each project.
    #[default]
    Flat,
    /// Walk Epic → Task → Subtask from each project's Epic.
    Hierarchy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneConfig {
    /// How many days before the run day the pruned date is. No default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_ago: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Spreadsheet cell holding the condition, e.g. `Config!B2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_cell: Option<String>,
    #[serde(default)]
    pub scope: PruneScope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,
    /// Overrides `summaries.date_format` when matching dates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitMode {
    /// Only fatal errors fail the run.
    #[default]
    Lenient,
    /// Any per-item error fails the run.
    Strict,
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Values supplied from the environment or command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub tracker_url: Option<String>,
    pub tracker_username: Option<String>,
    pub tracker_token: Option<String>,
    pub default_project: Option<String>,
    pub sheets_api_key: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub sheet_range: Option<String>,
}

// ---------------------------------------------------------------------------
// RunKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Reconcile,
    Prune,
    Directory,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub summaries: SummaryPolicy,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub prune: PruneConfig,
    #[serde(default)]
    pub exit_mode: ExitMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            tracker: TrackerConfig::default(),
            directory: DirectoryConfig::default(),
            summaries: SummaryPolicy::default(),
            reconcile: ReconcileConfig::default(),
            prune: PruneConfig::default(),
            exit_mode: ExitMode::default(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PmError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn apply_overrides(&mut self, o: &Overrides) {
        fn set(target: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *target = Some(v.to_string());
            }
        }
        if let Some(url) = o.tracker_url.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            self.tracker.base_url = url.to_string();
        }
        set(&mut self.tracker.username, &o.tracker_username);
        set(&mut self.tracker.token, &o.tracker_token);
        set(&mut self.tracker.default_project, &o.default_project);
        set(&mut self.directory.api_key, &o.sheets_api_key);
        set(&mut self.directory.spreadsheet_id, &o.spreadsheet_id);
        if let Some(range) = o.sheet_range.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            self.directory.range = range.to_string();
        }
    }

    /// Projects the Pruner walks: `prune.projects`, else the default project.
    pub fn prune_projects(&self) -> Vec<String> {
        if !self.prune.projects.is_empty() {
            return self.prune.projects.clone();
        }
        self.tracker.default_project.iter().cloned().collect()
    }

    /// Date pattern the Pruner matches against summaries.
    pub fn prune_date_format(&self) -> &str {
        self.prune
            .date_format
            .as_deref()
            .unwrap_or(&self.summaries.date_format)
    }

    /// Copy with credentials masked, for display.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if out.tracker.token.is_some() {
            out.tracker.token = Some(REDACTED.to_string());
        }
        if out.directory.api_key.is_some() {
            out.directory.api_key = Some(REDACTED.to_string());
        }
        out
    }

    /// Fail with a configuration error if `kind` cannot run with this config.
    pub fn ensure_runnable(&self, kind: RunKind) -> Result<()> {
        let errors: Vec<String> = self
            .validate_for(kind)
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PmError::Config(errors.join("; ")))
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check every section.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        self.check_tracker(&mut warnings);
        self.check_directory(&mut warnings);
        self.check_reconcile(&mut warnings);
        self.check_prune(&mut warnings);
        if self.prune.days_ago.is_none() {
            warnings.push(ConfigWarning::warning(
                "prune.days_ago is not set; prune runs need --days-ago or --date",
            ));
        }
        warnings
    }

    /// Check only what `kind` needs.
    pub fn validate_for(&self, kind: RunKind) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        match kind {
            RunKind::Directory => self.check_directory(&mut warnings),
            RunKind::Reconcile => {
                self.check_tracker(&mut warnings);
                self.check_directory(&mut warnings);
                self.check_reconcile(&mut warnings);
            }
            RunKind::Prune => {
                self.check_tracker(&mut warnings);
                self.check_prune(&mut warnings);
                if self.prune.condition_cell.is_some() {
                    self.check_directory(&mut warnings);
                }
            }
        }
        warnings
    }

    fn check_tracker(&self, warnings: &mut Vec<ConfigWarning>) {
        let t = &self.tracker;
        if t.base_url.trim().is_empty() {
            warnings.push(ConfigWarning::error("tracker.base_url is required (or JIRA_URL)"));
        } else if !t.base_url.starts_with("http://") && !t.base_url.starts_with("https://") {
            warnings.push(ConfigWarning::error(format!(
                "tracker.base_url '{}' must start with http:// or https://",
                t.base_url
            )));
        }
        if t.username.as_deref().map_or(true, str::is_empty) {
            warnings.push(ConfigWarning::error("tracker.username is required (or API_USERNAME)"));
        }
        if t.token.as_deref().map_or(true, str::is_empty) {
            warnings.push(ConfigWarning::error("tracker.token is required (or API_TOKEN)"));
        }
        if let Some(p) = &t.default_project {
            if !is_valid_project_code(p) {
                warnings.push(ConfigWarning::error(format!(
                    "tracker.default_project '{p}' is not a valid project key"
                )));
            }
        }
        if t.page_size == 0 || t.page_size > 100 {
            warnings.push(ConfigWarning::warning(format!(
                "tracker.page_size={} is outside 1..=100; the tracker will clamp it",
                t.page_size
            )));
        }
        if t.timeout_secs == 0 {
            warnings.push(ConfigWarning::error("tracker.timeout_secs must be greater than 0"));
        }
        for issue_type in IssueType::all() {
            if t.issue_types.name_for(*issue_type).trim().is_empty() {
                warnings.push(ConfigWarning::error(format!(
                    "tracker.issue_types.{issue_type} must not be empty"
                )));
            }
        }
    }

    fn check_directory(&self, warnings: &mut Vec<ConfigWarning>) {
        let d = &self.directory;
        if d.spreadsheet_id.as_deref().map_or(true, str::is_empty) {
            warnings.push(ConfigWarning::error(
                "directory.spreadsheet_id is required (or GOOGLE_SPREADSHEET_ID)",
            ));
        }
        if d.api_key.as_deref().map_or(true, str::is_empty) {
            warnings.push(ConfigWarning::error("directory.api_key is required (or GOOGLE_API_KEY)"));
        }
        if d.range.trim().is_empty() {
            warnings.push(ConfigWarning::error("directory.range must not be empty"));
        }
    }

    fn check_reconcile(&self, warnings: &mut Vec<ConfigWarning>) {
        for problem in self.summaries.problems() {
            warnings.push(ConfigWarning::error(problem));
        }
        if self.reconcile.subtask_dates && self.tracker.date_fields.is_none() {
            warnings.push(ConfigWarning::error(
                "reconcile.subtask_dates requires tracker.date_fields",
            ));
        }
    }

    fn check_prune(&self, warnings: &mut Vec<ConfigWarning>) {
        let p = &self.prune;
        if self.prune_projects().is_empty() {
            warnings.push(ConfigWarning::error(
                "prune needs prune.projects or tracker.default_project (or PROJECT_KEY)",
            ));
        }
        for code in &p.projects {
            if !is_valid_project_code(code) {
                warnings.push(ConfigWarning::error(format!(
                    "prune.projects entry '{code}' is not a valid project key"
                )));
            }
        }
        if p.condition.is_some() && p.condition_cell.is_some() {
            warnings.push(ConfigWarning::error(
                "prune.condition and prune.condition_cell are mutually exclusive",
            ));
        }
        if let Some(Err(reason)) = p.condition.as_deref().map(check_condition) {
            warnings.push(ConfigWarning::error(format!("prune.condition {reason}")));
        }
        if !is_valid_date_format(self.prune_date_format()) {
            warnings.push(ConfigWarning::error(format!(
                "date format '{}' is not a valid strftime pattern",
                self.prune_date_format()
            )));
        }
        if p.status.is_none() && p.condition.is_none() && p.condition_cell.is_none() {
            warnings.push(ConfigWarning::warning(
                "prune has no status or condition filter; any issue matching the date will be deleted",
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Project code validation
// ---------------------------------------------------------------------------

static PROJECT_RE: OnceLock<Regex> = OnceLock::new();

fn project_re() -> &'static Regex {
    PROJECT_RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,31}$").unwrap())
}

pub fn is_valid_project_code(code: &str) -> bool {
    project_re().is_match(code)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
