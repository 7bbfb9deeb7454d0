//! Error types for the sync engine

use ambient_types::RecordError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Indexer returned status {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Decoration failed for {record}: {reason}")]
    Decoration { record: String, reason: String },

    #[error("Chain SDK error: {0}")]
    Sdk(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

impl SyncError {
    pub fn decoration(record: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Decoration {
            record: record.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

impl From<validator::ValidationErrors> for SyncError {
    fn from(err: validator::ValidationErrors) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
