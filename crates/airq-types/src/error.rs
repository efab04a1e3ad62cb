//! Error types for data parsing in airq-types.

use thiserror::Error;

/// Errors that can occur when parsing provider data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// A provider timestamp could not be interpreted as an instant.
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// A provider name did not match any known provider.
    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),
}

/// Result type alias using airq-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
