// src/utils/errors.rs
//! Error types for the sniffer engine

use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Relay failed: {0}")]
    RelayFailed(String),

    /// The receiving context has been torn down. Callers usually treat this as expected.
    #[error("Context gone: {0}")]
    ContextGone(String),

    #[error("Storage failed: {0}")]
    StorageFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Archive layout error: {0}")]
    ArchiveFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl EngineError {
    /// Whether the error only signals that the peer context no longer exists.
    pub fn is_context_gone(&self) -> bool {
        matches!(self, EngineError::ContextGone(_))
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;
