//! Error types for profile-sync
//!
//! Every variant here is fatal for the batch. Row-level conditions
//! (unresolved IDs, non-200 PATCH responses) are values, not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Batch-aborting error
#[derive(Debug, Error)]
pub enum SyncError {
    /// Input CSV or SQL template missing/unreadable
    #[error("File not found: {path}: {source}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV, SQL template, XML or database result
    #[error("Parse error: {0}")]
    Parse(String),

    /// API or database unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Credentials rejected by the API or database
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Credential file problem
    #[error("Configuration error: {0}")]
    Config(#[from] elements_common::Error),
}

impl SyncError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::FileNotFound {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Connection(err.to_string())
    }
}

impl From<csv::Error> for SyncError {
    fn from(err: csv::Error) -> Self {
        SyncError::Parse(format!("CSV: {}", err))
    }
}

impl From<quick_xml::Error> for SyncError {
    fn from(err: quick_xml::Error) -> Self {
        SyncError::Parse(format!("XML: {}", err))
    }
}

/// Result alias for batch operations
pub type SyncResult<T> = Result<T, SyncError>;
