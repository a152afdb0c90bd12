use std::path::PathBuf;

use thiserror::Error;

/// Main error type for stride-sync
#[derive(Error, Debug)]
pub enum StrideError {
    #[error("Source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("Malformed record {id}: missing {field}")]
    MalformedRecord { id: String, field: &'static str },

    #[error("Data loss detected: activity count would drop from {before} to {after}")]
    DataLossDetected { before: usize, after: usize },

    #[error("Store corrupted at {}: {reason}", path.display())]
    StoreCorrupted {
        path: PathBuf,
        reason: String,
        latest_backup: Option<PathBuf>,
    },

    #[error("API token required. Set STRIDE_API_TOKEN before syncing.")]
    NotAuthenticated,

    #[error("Rate limited. Please wait before retrying.")]
    RateLimited,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid date format: {0}. Expected YYYY-MM-DD")]
    InvalidDateFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, StrideError>;

impl StrideError {
    /// Create a source-unavailable error for the named adapter
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid response error from a message
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create an invalid parameter error from a message
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Whether a later invocation may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::RateLimited | Self::Http(_)
        )
    }
}

/// Render an error for the operator, including the recovery hint where one exists
pub fn format_user_error(err: &StrideError) -> String {
    match err {
        StrideError::StoreCorrupted {
            latest_backup: Some(backup),
            ..
        } => format!(
            "{}\nRecommended recovery: stride backups restore {}",
            err,
            backup.display()
        ),
        StrideError::StoreCorrupted {
            latest_backup: None,
            ..
        } => format!("{}\nNo backup available; the cache was left untouched.", err),
        StrideError::DataLossDetected { .. } => format!(
            "{}\nNothing was written. This points at a merge bug or an adapter regression.",
            err
        ),
        StrideError::SourceUnavailable { .. } => {
            format!("{}\nThe cache was left untouched; retry later.", err)
        }
        _ => err.to_string(),
    }
}
