//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use airq_types::{Measurement, ProviderConfig, to_utc_seconds};

use crate::error::{Error, Result};

/// A device registration request. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    /// Device name.
    pub name: String,
    /// Provider key.
    pub provider: String,
    /// Provider-specific configuration.
    pub config: ProviderConfig,
}

impl NewDevice {
    /// Create a registration request.
    pub fn new(name: impl Into<String>, provider: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            config,
        }
    }
}

/// A measurement row joined with its device name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMeasurement {
    /// Database row ID.
    pub id: i64,
    /// Device identifier.
    pub device_id: i64,
    /// Normalized UTC timestamp, whole seconds.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub pm1: Option<f64>,
    pub pm2: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<i64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub nox: Option<i64>,
    pub tvoc: Option<i64>,
    /// Name of the device at query time.
    pub device_name: String,
}

impl StoredMeasurement {
    /// Convert back to a [`Measurement`] carrying the stored timestamp.
    pub fn to_measurement(&self) -> Measurement {
        Measurement {
            device_id: self.device_id,
            timestamp: Some(self.timestamp),
            pm1: self.pm1,
            pm2: self.pm2,
            pm10: self.pm10,
            co2: self.co2,
            temperature: self.temperature,
            humidity: self.humidity,
            nox: self.nox,
            tvoc: self.tvoc,
        }
    }
}

/// Format an instant the way timestamps are stored: UTC, whole seconds, no offset.
pub fn format_db_timestamp(ts: OffsetDateTime) -> Result<String> {
    to_utc_seconds(ts)
        .map_err(|e| Error::InvalidTimestamp(e.to_string()))?
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .map_err(|e| Error::InvalidTimestamp(e.to_string()))
}

/// Parse a stored timestamp back into a UTC instant.
///
/// Accepts fractional seconds, which SQLite's own `CURRENT_TIMESTAMP` never
/// writes but hand-edited rows might.
pub fn parse_db_timestamp(raw: &str) -> Result<OffsetDateTime> {
    let formats = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ];
    formats
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(raw, *fmt).ok())
        .map(PrimitiveDateTime::assume_utc)
        .ok_or_else(|| Error::InvalidTimestamp(raw.to_string()))
}
