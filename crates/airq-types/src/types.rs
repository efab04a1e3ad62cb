//! Core types for device and measurement data.

use core::fmt;
use std::collections::BTreeMap;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Provider-specific device configuration (e.g. `api_token`, `location_id`).
///
/// Stored as a JSON object of string values in the device registry.
pub type ProviderConfig = BTreeMap<String, String>;

/// Sensor data providers with a built-in adapter.
///
/// This enum is marked `#[non_exhaustive]` so new providers can be added
/// without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[non_exhaustive]
pub enum Provider {
    /// AirGradient cloud API (`api.airgradient.com`).
    AirGradient,
}

impl Provider {
    /// Every provider known to this build.
    pub const ALL: &'static [Provider] = &[Provider::AirGradient];

    /// The registry key used for this provider.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::AirGradient => "airgradient",
        }
    }

    /// Comma-separated list of supported provider names, for error messages.
    #[must_use]
    pub fn supported_names() -> String {
        Self::ALL
            .iter()
            .map(Provider::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Provider {
    type Err = ParseError;

    /// Parse a provider key.
    ///
    /// # Examples
    ///
    /// ```
    /// use airq_types::Provider;
    ///
    /// assert_eq!("airgradient".parse(), Ok(Provider::AirGradient));
    /// assert!("purpleair".parse::<Provider>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "airgradient" => Ok(Provider::AirGradient),
            other => Err(ParseError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered sensor device.
///
/// `provider` is kept as the raw registry string: a name with no matching
/// adapter is only rejected when an adapter is constructed for it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    /// Stable device identifier (max existing id + 1 at registration).
    pub id: i64,
    /// Human-readable device name.
    pub name: String,
    /// Provider key, e.g. `"airgradient"`.
    pub provider: String,
    /// Provider-specific configuration.
    pub config: ProviderConfig,
    /// Whether the device is polled and queryable.
    pub active: bool,
    /// When the device was registered.
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "time::serde::rfc3339::option")
    )]
    pub created_at: Option<OffsetDateTime>,
}

impl Device {
    /// Create an active device with no registration time.
    pub fn new(
        id: i64,
        name: impl Into<String>,
        provider: impl Into<String>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            provider: provider.into(),
            config,
            active: true,
            created_at: None,
        }
    }

    /// Metadata view of this device.
    #[must_use]
    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            id: self.id,
            name: self.name.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// Pure device metadata: `{id, name, provider}`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceDescriptor {
    pub id: i64,
    pub name: String,
    pub provider: String,
}

/// A normalized sensor reading, as produced by a device adapter.
///
/// Every sensor field is optional: fields the provider does not report are
/// `None`, never zero.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Device that produced the reading.
    pub device_id: i64,
    /// Provider-reported instant, in whatever offset the provider used.
    ///
    /// `None` means the ingestion time is used when the reading is stored.
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "time::serde::rfc3339::option")
    )]
    pub timestamp: Option<OffsetDateTime>,
    /// PM1.0 in µg/m³.
    pub pm1: Option<f64>,
    /// PM2.5 in µg/m³.
    pub pm2: Option<f64>,
    /// PM10 in µg/m³.
    pub pm10: Option<f64>,
    /// CO2 in ppm.
    pub co2: Option<i64>,
    /// Temperature in °C.
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    /// NOx index.
    pub nox: Option<i64>,
    /// TVOC index.
    pub tvoc: Option<i64>,
}

impl Measurement {
    /// Create an empty measurement for a device.
    pub fn new(device_id: i64) -> Self {
        Self {
            device_id,
            ..Default::default()
        }
    }

    /// Set the provider timestamp.
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether the reading carries no sensor values at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pm1.is_none()
            && self.pm2.is_none()
            && self.pm10.is_none()
            && self.co2.is_none()
            && self.temperature.is_none()
            && self.humidity.is_none()
            && self.nox.is_none()
            && self.tvoc.is_none()
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "PM2.5={}, CO2={}, Temp={}",
            show(&self.pm2),
            show(&self.co2),
            show(&self.temperature)
        )
    }
}
