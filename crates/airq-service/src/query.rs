//! Validated read access to the store.
//!
//! Every function checks its external parameters before the time series is
//! touched. Bad parameters are a [`QueryError::Validation`]; a well-formed
//! id that names no active device is a [`QueryError::NotFound`].

use airq_store::{Store, StoredMeasurement};
use airq_types::DeviceDescriptor;

/// Smallest history window, in hours.
pub const MIN_HOURS: i64 = 1;
/// Largest history window, in hours (one week).
pub const MAX_HOURS: i64 = 168;

/// Errors returned by the query functions.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A parameter was rejected before the store was consulted.
    #[error("{0}")]
    Validation(String),
    /// The device is unknown or inactive, or there is no data.
    #[error("{0}")]
    NotFound(String),
    /// The store failed.
    #[error(transparent)]
    Store(#[from] airq_store::Error),
}

/// Result type for query functions.
pub type QueryResult<T> = Result<T, QueryError>;

/// Parse a device id from a request path segment.
pub fn parse_device_id(raw: &str) -> QueryResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| QueryError::Validation(format!("Invalid device ID: {}", raw)))
}

/// Parse an hour count from a request path segment.
pub fn parse_hours(raw: &str) -> QueryResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| QueryError::Validation(format!("Invalid hours: {}", raw)))
}

/// Check `hours` lies in `[MIN_HOURS, MAX_HOURS]`.
pub fn validate_hours(hours: i64) -> QueryResult<u32> {
    if !(MIN_HOURS..=MAX_HOURS).contains(&hours) {
        return Err(QueryError::Validation(format!(
            "Hours must be between {} and {}",
            MIN_HOURS, MAX_HOURS
        )));
    }
    Ok(hours as u32)
}

/// Check `device_id` is positive and names an active device.
pub fn validate_device_id(store: &Store, device_id: i64) -> QueryResult<i64> {
    if device_id <= 0 {
        return Err(QueryError::Validation(
            "Device ID must be a positive integer".to_string(),
        ));
    }
    if !store.is_active_device(device_id)? {
        return Err(QueryError::NotFound(format!(
            "Active device with ID {} not found",
            device_id
        )));
    }
    Ok(device_id)
}

/// Active devices ordered by name.
pub fn list_devices(store: &Store) -> QueryResult<Vec<DeviceDescriptor>> {
    let mut devices: Vec<DeviceDescriptor> = store
        .list_active_devices()?
        .iter()
        .map(|d| d.descriptor())
        .collect();
    devices.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(devices)
}

/// The latest measurement for one device, or across all devices.
pub fn current(store: &Store, device_id: Option<i64>) -> QueryResult<StoredMeasurement> {
    let device_id = device_id
        .map(|id| validate_device_id(store, id))
        .transpose()?;
    store
        .latest_measurement(device_id)?
        .ok_or_else(|| QueryError::NotFound("No data available".to_string()))
}

/// Measurements from the last `hours` hours, oldest first. May be empty.
pub fn history(
    store: &Store,
    hours: i64,
    device_id: Option<i64>,
) -> QueryResult<Vec<StoredMeasurement>> {
    let hours = validate_hours(hours)?;
    let device_id = device_id
        .map(|id| validate_device_id(store, id))
        .transpose()?;
    Ok(store.measurement_window(hours, device_id)?)
}

/// The most recent rows across all devices, newest first.
pub fn recent(store: &Store, limit: u32) -> QueryResult<Vec<StoredMeasurement>> {
    Ok(store.recent_measurements(limit)?)
}
