//! AirGradient cloud API adapter.
//!
//! Reads `GET {base}/locations/{location_id}/measures/current?token={api_token}`
//! and maps AirGradient's field names onto [`Measurement`]:
//!
//! | AirGradient | Measurement |
//! |-------------|-------------|
//! | `pm01` | `pm1` |
//! | `pm02` | `pm2` |
//! | `pm10` | `pm10` |
//! | `rco2` | `co2` |
//! | `atmp` | `temperature` |
//! | `rhum` | `humidity` |
//! | `noxIndex` | `nox` |
//! | `tvocIndex` | `tvoc` |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use airq_types::{Device, DeviceDescriptor, Measurement, parse_timestamp};

use crate::error::{Error, Result};
use crate::traits::{AdapterOptions, DeviceAdapter};

/// Public AirGradient API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.airgradient.com/public/api/v1";

/// Config key holding the API token.
pub const API_TOKEN_KEY: &str = "api_token";
/// Config key holding the location id.
pub const LOCATION_ID_KEY: &str = "location_id";
/// Optional config key overriding [`DEFAULT_API_BASE_URL`].
pub const API_BASE_URL_KEY: &str = "api_base_url";

/// Adapter for devices registered under the `airgradient` provider.
#[derive(Debug, Clone)]
pub struct AirGradientAdapter {
    device: DeviceDescriptor,
    api_token: String,
    location_id: String,
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl AirGradientAdapter {
    /// Config keys every AirGradient device must carry.
    pub const REQUIRED_KEYS: &'static [&'static str] = &[API_TOKEN_KEY, LOCATION_ID_KEY];

    /// Build an adapter, checking that all required config keys are present.
    pub fn new(device: &Device, options: &AdapterOptions) -> Result<Self> {
        let api_token = required_key(device, API_TOKEN_KEY)?;
        let location_id = required_key(device, LOCATION_ID_KEY)?;
        let base_url = device
            .config
            .get(API_BASE_URL_KEY)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(options.fetch_timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            device: device.descriptor(),
            api_token,
            location_id,
            base_url,
            timeout: options.fetch_timeout,
            client,
        })
    }

    /// Endpoint for the location's current measures (without the token).
    pub fn measures_url(&self) -> String {
        format!(
            "{}/locations/{}/measures/current",
            self.base_url, self.location_id
        )
    }
}

fn required_key(device: &Device, key: &str) -> Result<String> {
    device
        .config
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::MissingConfig {
            device: device.name.clone(),
            key: key.to_string(),
        })
}

#[async_trait]
impl DeviceAdapter for AirGradientAdapter {
    fn describe(&self) -> DeviceDescriptor {
        self.device.clone()
    }

    async fn fetch(&self) -> Result<Measurement> {
        let response = self
            .client
            .get(self.measures_url())
            .query(&[("token", self.api_token.as_str())])
            .send()
            .await
            .map_err(|e| Error::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let measures: CurrentMeasures = response
            .json()
            .await
            .map_err(|e| Error::from_reqwest(e, self.timeout))?;

        measures.into_measurement(self.device.id)
    }
}

/// Body of the `measures/current` endpoint. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentMeasures {
    timestamp: Option<String>,
    pm01: Option<f64>,
    pm02: Option<f64>,
    pm10: Option<f64>,
    rco2: Option<f64>,
    atmp: Option<f64>,
    rhum: Option<f64>,
    nox_index: Option<f64>,
    tvoc_index: Option<f64>,
}

impl CurrentMeasures {
    fn into_measurement(self, device_id: i64) -> Result<Measurement> {
        let timestamp = self
            .timestamp
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        Ok(Measurement {
            device_id,
            timestamp,
            pm1: self.pm01,
            pm2: self.pm02,
            pm10: self.pm10,
            co2: whole(self.rco2),
            temperature: self.atmp,
            humidity: self.rhum,
            nox: whole(self.nox_index),
            tvoc: whole(self.tvoc_index),
        })
    }
}

/// Integer-valued fields sometimes arrive as floats (`"rco2": 512.0`).
fn whole(value: Option<f64>) -> Option<i64> {
    value.filter(|v| v.is_finite()).map(|v| v.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    use airq_types::ProviderConfig;
    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::StatusCode,
        routing::get,
    };
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use time::macros::datetime;

    fn device_with(config: &[(&str, &str)]) -> Device {
        let config: ProviderConfig = config
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Device::new(4, "Living Room", "airgradient", config)
    }

    async fn current(
        Path(location): Path<String>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        if params.get("token").map(String::as_str) != Some("secret") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad token"})));
        }
        match location.as_str() {
            "1234" => (
                StatusCode::OK,
                Json(json!({
                    "locationId": 1234,
                    "timestamp": "2024-01-01T00:00:00.000Z",
                    "pm01": 1.5,
                    "pm02": 4.25,
                    "pm10": 6.0,
                    "rco2": 612,
                    "atmp": 21.4,
                    "rhum": 44.0,
                    "noxIndex": 1,
                    "tvocIndex": 97.6
                })),
            ),
            "sparse" => (StatusCode::OK, Json(json!({"rco2": 500}))),
            "garbled" => (StatusCode::OK, Json(json!({"timestamp": "not a time"}))),
            "overflow" => (
                StatusCode::OK,
                Json(json!({"timestamp": "9999-12-31T23:59:59-01:00", "rco2": 500})),
            ),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                (StatusCode::OK, Json(json!({})))
            }
            _ => (StatusCode::NOT_FOUND, Json(json!({"message": "unknown"}))),
        }
    }

    async fn spawn_provider() -> String {
        let app = Router::new().route(
            "/public/api/v1/locations/{location}/measures/current",
            get(current),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/public/api/v1", addr)
    }

    fn adapter(base: &str, location: &str, token: &str, timeout: Duration) -> AirGradientAdapter {
        let device = device_with(&[
            (API_TOKEN_KEY, token),
            (LOCATION_ID_KEY, location),
            (API_BASE_URL_KEY, base),
        ]);
        AirGradientAdapter::new(&device, &AdapterOptions::with_timeout(timeout)).unwrap()
    }

    #[test]
    fn test_missing_required_keys() {
        let device = device_with(&[(API_TOKEN_KEY, "secret")]);
        let err = AirGradientAdapter::new(&device, &AdapterOptions::default()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("location_id"));

        let device = device_with(&[(API_TOKEN_KEY, "  "), (LOCATION_ID_KEY, "1")]);
        let err = AirGradientAdapter::new(&device, &AdapterOptions::default()).unwrap_err();
        assert!(err.to_string().contains("api_token"));
    }

    #[test]
    fn test_describe_and_url() {
        let device = device_with(&[(API_TOKEN_KEY, "secret"), (LOCATION_ID_KEY, "1234")]);
        let adapter = AirGradientAdapter::new(&device, &AdapterOptions::default()).unwrap();

        let descriptor = adapter.describe();
        assert_eq!(descriptor.id, 4);
        assert_eq!(descriptor.name, "Living Room");
        assert_eq!(descriptor.provider, "airgradient");
        assert_eq!(
            adapter.measures_url(),
            "https://api.airgradient.com/public/api/v1/locations/1234/measures/current"
        );
        assert!(!adapter.measures_url().contains("secret"));
    }

    #[tokio::test]
    async fn test_fetch_maps_fields() {
        let base = spawn_provider().await;
        let adapter = adapter(&base, "1234", "secret", Duration::from_secs(5));

        let m = adapter.fetch().await.unwrap();
        assert_eq!(m.device_id, 4);
        assert_eq!(m.timestamp, Some(datetime!(2024-01-01 00:00:00 UTC)));
        assert_eq!(m.pm1, Some(1.5));
        assert_eq!(m.pm2, Some(4.25));
        assert_eq!(m.pm10, Some(6.0));
        assert_eq!(m.co2, Some(612));
        assert_eq!(m.temperature, Some(21.4));
        assert_eq!(m.humidity, Some(44.0));
        assert_eq!(m.nox, Some(1));
        assert_eq!(m.tvoc, Some(98));
    }

    #[tokio::test]
    async fn test_fetch_missing_fields_are_absent() {
        let base = spawn_provider().await;
        let adapter = adapter(&base, "sparse", "secret", Duration::from_secs(5));

        let m = adapter.fetch().await.unwrap();
        assert_eq!(m.co2, Some(500));
        assert_eq!(m.timestamp, None);
        assert_eq!(m.pm2, None);
        assert_eq!(m.temperature, None);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let base = spawn_provider().await;

        let adapter = adapter(&base, "1234", "wrong", Duration::from_secs(5));
        assert!(matches!(
            adapter.fetch().await,
            Err(Error::Status { status: 401 })
        ));
        assert!(adapter.fetch_data().await.is_none());

        let adapter = self::adapter(&base, "9999", "secret", Duration::from_secs(5));
        assert!(matches!(
            adapter.fetch().await,
            Err(Error::Status { status: 404 })
        ));
    }

    #[tokio::test]
    async fn test_fetch_bad_timestamp_is_invalid_response() {
        let base = spawn_provider().await;
        let adapter = adapter(&base, "garbled", "secret", Duration::from_secs(5));
        assert!(matches!(
            adapter.fetch().await,
            Err(Error::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_timestamp_past_calendar_end() {
        let base = spawn_provider().await;
        let adapter = adapter(&base, "overflow", "secret", Duration::from_secs(5));
        assert!(matches!(
            adapter.fetch().await,
            Err(Error::InvalidResponse(_))
        ));
        assert!(adapter.fetch_data().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let base = spawn_provider().await;
        let adapter = adapter(&base, "slow", "secret", Duration::from_millis(200));

        let err = adapter.fetch().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
        assert!(adapter.fetch_data().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = format!("http://{}", addr);
        let adapter = adapter(&base, "1234", "secret", Duration::from_secs(2));
        let err = adapter.fetch().await.unwrap_err();
        assert!(err.is_transport());
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_whole_rounds_and_skips_nan() {
        assert_eq!(whole(Some(97.6)), Some(98));
        assert_eq!(whole(Some(f64::NAN)), None);
        assert_eq!(whole(None), None);
    }
}
