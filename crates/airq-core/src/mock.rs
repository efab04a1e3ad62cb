//! Mock adapter implementation for testing.
//!
//! [`MockAdapter`] implements [`DeviceAdapter`] without any network access,
//! so the poller and device commands can be exercised in tests.
//!
//! # Features
//!
//! - **Failure injection**: make every fetch fail with a transport error
//! - **Latency simulation**: delay fetches; delays past the fetch timeout
//!   surface as [`Error::Timeout`]
//! - **Config-driven behaviour**: [`MockAdapter::from_device`] reads its
//!   behaviour from the device config, so registry rows can describe it

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use airq_types::{Device, DeviceDescriptor, Measurement};

use crate::error::{Error, Result};
use crate::traits::{AdapterOptions, DeviceAdapter};

/// Provider name conventionally used to register [`MockAdapter`].
pub const MOCK_PROVIDER: &str = "mock";

/// A mock adapter for testing.
///
/// # Example
///
/// ```
/// use airq_core::{DeviceAdapter, MockAdapter};
/// use airq_types::{Device, ProviderConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let device = Device::new(1, "Test", "mock", ProviderConfig::new());
///     let adapter = MockAdapter::new(&device);
///     assert!(adapter.fetch_data().await.is_some());
///
///     adapter.set_should_fail(true);
///     assert!(adapter.fetch_data().await.is_none());
/// }
/// ```
pub struct MockAdapter {
    device: DeviceDescriptor,
    reading: RwLock<Measurement>,
    should_fail: AtomicBool,
    /// Simulated fetch latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    fetch_count: AtomicU32,
    timeout: Duration,
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("device", &self.device)
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockAdapter {
    /// Create a mock that returns a fixed indoor reading with no timestamp.
    pub fn new(device: &Device) -> Self {
        Self {
            device: device.descriptor(),
            reading: RwLock::new(Self::default_reading(device.id)),
            should_fail: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            fetch_count: AtomicU32::new(0),
            timeout: AdapterOptions::default().fetch_timeout,
        }
    }

    /// Create a mock whose behaviour comes from the device config.
    ///
    /// Recognised keys: `fail` (`"true"`), `latency_ms`, `co2`, `pm2`,
    /// `timestamp` (RFC 3339).
    pub fn from_device(device: &Device, options: &AdapterOptions) -> Self {
        let mut reading = Self::default_reading(device.id);
        let config = &device.config;
        if let Some(co2) = config.get("co2").and_then(|v| v.parse().ok()) {
            reading.co2 = Some(co2);
        }
        if let Some(pm2) = config.get("pm2").and_then(|v| v.parse().ok()) {
            reading.pm2 = Some(pm2);
        }
        if let Some(ts) = config
            .get("timestamp")
            .and_then(|v| airq_types::parse_timestamp(v).ok())
        {
            reading.timestamp = Some(ts);
        }

        let adapter = Self {
            reading: RwLock::new(reading),
            timeout: options.fetch_timeout,
            ..Self::new(device)
        };
        adapter.set_should_fail(config.get("fail").is_some_and(|v| v == "true"));
        if let Some(ms) = config.get("latency_ms").and_then(|v| v.parse().ok()) {
            adapter.set_latency(Duration::from_millis(ms));
        }
        adapter
    }

    fn default_reading(device_id: i64) -> Measurement {
        Measurement {
            device_id,
            timestamp: None,
            pm1: Some(1.0),
            pm2: Some(3.0),
            pm10: Some(4.0),
            co2: Some(650),
            temperature: Some(21.5),
            humidity: Some(45.0),
            nox: Some(1),
            tvoc: Some(100),
        }
    }

    /// Builder form of [`MockAdapter::set_reading`], for use in constructors.
    pub fn with_reading(mut self, reading: Measurement) -> Self {
        self.reading = RwLock::new(reading);
        self
    }

    /// Replace the reading returned by successful fetches.
    pub async fn set_reading(&self, reading: Measurement) {
        *self.reading.write().await = reading;
    }

    /// Make every subsequent fetch fail (or succeed again).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent fetch.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of fetches attempted so far.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceAdapter for MockAdapter {
    fn describe(&self) -> DeviceDescriptor {
        self.device.clone()
    }

    async fn fetch(&self) -> Result<Measurement> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let latency = Duration::from_millis(self.latency_ms.load(Ordering::SeqCst));
        if !latency.is_zero()
            && tokio::time::timeout(self.timeout, tokio::time::sleep(latency))
                .await
                .is_err()
        {
            return Err(Error::Timeout(self.timeout));
        }

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Unavailable(format!(
                "mock failure for {}",
                self.device.name
            )));
        }

        Ok(self.reading.read().await.clone())
    }
}
