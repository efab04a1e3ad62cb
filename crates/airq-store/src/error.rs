//! Storage errors.

use std::path::PathBuf;

/// Result alias used throughout the store.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reading or writing the device registry and time series.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The parent directory of the database file could not be created.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No device row carries this id.
    #[error("Device with ID {0} not found")]
    DeviceNotFound(i64),

    /// A timestamp could not be formatted for, or parsed from, a row.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A device's provider config could not be encoded as JSON.
    #[error("Invalid device config: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error names a missing device rather than a storage fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DeviceNotFound(_))
    }
}
