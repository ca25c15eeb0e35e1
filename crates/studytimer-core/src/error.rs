//! Core error types for studytimer-core.
//!
//! Defined with thiserror. The propagation policy follows the app
//! design: validation errors are resolved at the boundary where the
//! input entered, persistence errors are converted to advisory
//! warnings by the driver, and restoration errors fall back to the
//! configuration screen instead of exposing a half-built engine.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for studytimer-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-file errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// User-input validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Snapshot/remote restoration errors
    #[error("Restore error: {0}")]
    Restore(#[from] RestoreError),

    /// Remote persistence API errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// User-input validation errors.
///
/// Always produced synchronously, before any timer or persistence
/// interaction, so a rejected form never creates a partial session.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid value for a named form field
    #[error("Invalid value for '{field}': {message}")]
    InvalidField { field: String, message: String },

    /// Required field missing or too short
    #[error("'{field}' is required (minimum {min_len} characters)")]
    MissingField { field: String, min_len: usize },
}

/// Restoration failures.
///
/// All of these mean "return the user to the configuration screen";
/// none of them may crash the caller or leak a half-initialized
/// timer.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RestoreError {
    /// Snapshot older than the freshness window
    #[error("Snapshot is stale (written {age_ms} ms ago, window {window_ms} ms)")]
    Stale { age_ms: u64, window_ms: u64 },

    /// Snapshot fields fail validation
    #[error("Snapshot is malformed: {0}")]
    Malformed(String),

    /// Remote resume payload missing or invalid required numeric fields
    #[error("Remote session state is invalid: {0}")]
    InvalidRemoteState(String),
}

/// Remote persistence API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure (connection, timeout, TLS)
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with success=false or a non-2xx status
    #[error("Server rejected request: {0}")]
    Rejected(String),

    /// Response body did not match the expected envelope
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Base URL is invalid
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => {
                DatabaseError::NotFound("query returned no rows".into())
            }
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
