//! Error types for dosetrack-core

use thiserror::Error;

/// Main error type for the dosetrack-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid medication definition
    #[error("invalid medication: {0}")]
    InvalidMedication(String),

    /// Snapshot export/import error
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Legacy-data migration error
    #[error("migration error: {0}")]
    Migration(String),
}

/// Result type alias for dosetrack-core
pub type Result<T> = std::result::Result<T, Error>;
