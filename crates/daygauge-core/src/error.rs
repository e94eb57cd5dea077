//! Core error types for daygauge-core.
//!
//! This module defines the error hierarchy using thiserror. An increment that
//! is refused because the gauge already moved today is *not* an error; see
//! [`crate::engine::IncrementOutcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for daygauge-core.
#[derive(Error, Debug)]
pub enum GaugeError {
    /// No gauge with this name exists
    #[error("Gauge not found: {name}")]
    NotFound { name: String },

    /// A gauge with this name already exists
    #[error("Gauge already exists: {name}")]
    Conflict { name: String },

    /// Gauge names are restricted to ASCII letters
    #[error("Invalid gauge name '{name}': only letters a-z and A-Z are allowed")]
    InvalidName { name: String },

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GaugeError {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        GaugeError::NotFound { name: name.into() }
    }

    pub(crate) fn conflict(name: impl Into<String>) -> Self {
        GaugeError::Conflict { name: name.into() }
    }
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
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

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored value could not be decoded
    #[error("Corrupt record for '{name}': {message}")]
    Corrupt { name: String, message: String },

    /// The flat-file document could not be parsed or written
    #[error("Invalid gauge document at {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding the store was poisoned by a panicking thread
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Lower bound above upper bound
    #[error("Invalid gauge bounds: min_value ({min}) must not exceed max_value ({max})")]
    InvalidBounds { min: i64, max: i64 },

    /// Timezone identifier could not be resolved
    #[error("Unknown timezone: '{0}'")]
    UnknownTimezone(String),

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// The data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy
                ) =>
            {
                StorageError::Locked
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for GaugeError {
    fn from(err: rusqlite::Error) -> Self {
        GaugeError::Storage(err.into())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StorageError::Poisoned
    }
}

impl<T> From<std::sync::PoisonError<T>> for GaugeError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        GaugeError::Storage(StorageError::Poisoned)
    }
}

/// Result type alias for GaugeError
pub type Result<T, E = GaugeError> = std::result::Result<T, E>;
