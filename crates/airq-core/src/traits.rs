//! Trait abstractions for device adapters.
//!
//! This module provides the [`DeviceAdapter`] trait that hides each
//! provider's fetch protocol behind one contract, so the poller and the
//! device-management commands never care which provider they talk to.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use airq_types::{DeviceDescriptor, Measurement};

use crate::error::Result;

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Options shared by every adapter built from one factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Upper bound on a single fetch round-trip.
    pub fetch_timeout: Duration,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl AdapterOptions {
    /// Options with a custom fetch timeout.
    pub fn with_timeout(fetch_timeout: Duration) -> Self {
        Self { fetch_timeout }
    }
}

/// One provider's way of reading a device.
///
/// Implementors only provide [`describe`](Self::describe) and
/// [`fetch`](Self::fetch). Callers that must not fail (the poller, connection
/// tests) use [`fetch_data`](Self::fetch_data), which reports errors through
/// `tracing` and yields `None` instead.
///
/// # Example
///
/// ```ignore
/// use airq_core::DeviceAdapter;
///
/// async fn poll(adapter: &dyn DeviceAdapter) {
///     if let Some(reading) = adapter.fetch_data().await {
///         println!("{}: {}", adapter.describe().name, reading);
///     }
/// }
/// ```
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// Device metadata. Never performs I/O.
    fn describe(&self) -> DeviceDescriptor;

    /// Perform one round-trip to the provider and map the reply onto
    /// [`Measurement`]. Fields the provider does not report stay `None`.
    async fn fetch(&self) -> Result<Measurement>;

    /// Like [`fetch`](Self::fetch), but transport failures are logged and
    /// turned into `None`.
    async fn fetch_data(&self) -> Option<Measurement> {
        let device = self.describe();
        match self.fetch().await {
            Ok(measurement) => {
                debug!("Fetched data from {}: {:?}", device.name, measurement);
                Some(measurement)
            }
            Err(e) => {
                warn!(
                    device_id = device.id,
                    "Error fetching data from {}: {}", device.name, e
                );
                None
            }
        }
    }
}
