use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PmError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("source read failed: {0}")]
    SourceRead(String),

    #[error("owner not found: {0}")]
    OwnerNotFound(String),

    #[error("failed to create '{summary}': {message}")]
    CreateFailure { summary: String, message: String },

    #[error("failed to delete {key}: {status} - {body}")]
    DeleteFailure {
        key: String,
        status: u16,
        body: String,
    },

    #[error("tracker returned {status}: {body}")]
    Tracker { status: u16, body: String },

    #[error("invalid issue type: {0}")]
    InvalidIssueType(String),

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PmError {
    /// Errors that abort a whole run rather than a single branch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PmError::Config(_) | PmError::ConfigNotFound(_) | PmError::SourceRead(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PmError>;
