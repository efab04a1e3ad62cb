//! Error types for airq-core.
//!
//! Adapter errors fall into two groups that callers treat differently:
//!
//! | Group | Variants | Handling |
//! |-------|----------|----------|
//! | Configuration | [`Error::UnknownProvider`], [`Error::MissingConfig`] | Abort the operation that built the adapter (device add, poll of that device) |
//! | Transport | [`Error::Timeout`], [`Error::Http`], [`Error::Status`], [`Error::InvalidResponse`], [`Error::Unavailable`] | Log, skip the device for this tick |
//!
//! Transport errors never escape [`DeviceAdapter::fetch_data`](crate::DeviceAdapter::fetch_data);
//! they are reported through `tracing` and turned into `None`.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when building or using a device adapter.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No adapter is registered for the device's provider.
    #[error("Unknown device provider: {provider} (supported: {supported})")]
    UnknownProvider { provider: String, supported: String },

    /// A provider-required configuration key is absent or empty.
    #[error("Device '{device}' is missing required config key '{key}'")]
    MissingConfig { device: String, key: String },

    /// The provider did not answer within the fetch timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network-level failure talking to the provider.
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Provider returned HTTP {status}")]
    Status { status: u16 },

    /// The provider answered but the body could not be interpreted.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    /// The provider could not be reached for another reason.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Whether this error is a configuration error (fatal to the operation
    /// that constructed the adapter).
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::UnknownProvider { .. } | Error::MissingConfig { .. })
    }

    /// Whether this error is a transport error (recovered at the adapter boundary).
    pub fn is_transport(&self) -> bool {
        !self.is_configuration()
    }

    /// Map a reqwest error, dropping the request URL since it may carry credentials.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Error::Timeout(timeout)
        } else if err.is_decode() {
            Error::InvalidResponse(err.without_url().to_string())
        } else if let Some(status) = err.status() {
            Error::Status {
                status: status.as_u16(),
            }
        } else {
            Error::Http(err.without_url())
        }
    }
}

/// Result type alias using airq-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
