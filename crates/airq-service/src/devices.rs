//! Device management operations behind the `airq device` commands.
//!
//! These functions do the registry work and return what happened; prompting
//! and printing stay in the binary.

use tabled::{builder::Builder, settings::Style};
use time::macros::format_description;

use airq_core::AdapterFactory;
use airq_store::{NewDevice, Store};
use airq_types::{Device, Measurement, ProviderConfig};

/// Config key filled from `--token`.
pub const TOKEN_KEY: &str = "api_token";
/// Config key filled from `--location`.
pub const LOCATION_KEY: &str = "location_id";

/// Errors from device management.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Unknown provider '{provider}'. Supported: {supported}")]
    UnknownProvider { provider: String, supported: String },

    #[error(transparent)]
    Config(airq_core::Error),

    #[error("Invalid config entry '{0}': expected key=value")]
    InvalidConfigEntry(String),

    #[error("Device with ID {0} not found")]
    NotFound(i64),

    #[error("Active device with ID {0} not found")]
    NotActive(i64),

    #[error("Connection validation failed - no data received. Use --force to add device anyway")]
    ValidationFailed,

    #[error(transparent)]
    Store(#[from] airq_store::Error),
}

/// Parse one `--config key=value` argument.
pub fn parse_config_entry(raw: &str) -> Result<(String, String), DeviceError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(DeviceError::InvalidConfigEntry(raw.to_string())),
    }
}

/// Assemble a provider config from the `add` flags.
///
/// `--token` and `--location` win over `--config` entries with the same key.
pub fn build_config(
    token: Option<String>,
    location: Option<String>,
    entries: Vec<(String, String)>,
) -> ProviderConfig {
    let mut config: ProviderConfig = entries.into_iter().collect();
    if let Some(token) = token {
        config.insert(TOKEN_KEY.to_string(), token);
    }
    if let Some(location) = location {
        config.insert(LOCATION_KEY.to_string(), location);
    }
    config
}

/// Result of the optional connection check during `add`.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// No check was requested.
    Skipped,
    /// The prospective device returned a reading.
    Passed(Measurement),
    /// The check failed but `--force` was given.
    FailedForced,
}

/// A device that was registered.
#[derive(Debug)]
pub struct Added {
    pub device: Device,
    pub validation: Validation,
}

/// Register a device.
///
/// The provider and its required config keys are always checked by building
/// the adapter. With `validate`, one fetch is made against the prospective
/// device first; a failed fetch aborts unless `force` is set.
pub async fn add_device(
    store: &Store,
    factory: &AdapterFactory,
    request: NewDevice,
    validate: bool,
    force: bool,
) -> Result<Added, DeviceError> {
    if !factory.supports(&request.provider) {
        return Err(DeviceError::UnknownProvider {
            provider: request.provider,
            supported: factory.providers().join(", "),
        });
    }

    let candidate = Device::new(
        store.next_device_id()?,
        request.name.clone(),
        request.provider.clone(),
        request.config.clone(),
    );
    let adapter = factory.create(&candidate).map_err(DeviceError::Config)?;

    let validation = if validate {
        match adapter.fetch_data().await {
            Some(reading) => Validation::Passed(reading),
            None if force => Validation::FailedForced,
            None => return Err(DeviceError::ValidationFailed),
        }
    } else {
        Validation::Skipped
    };

    let device = store.add_device(&request)?;
    Ok(Added { device, validation })
}

/// Look up a device by id, active or not.
pub fn find_device(store: &Store, device_id: i64) -> Result<Device, DeviceError> {
    store
        .get_device(device_id)?
        .ok_or(DeviceError::NotFound(device_id))
}

/// Delete a device and return what was removed.
pub fn remove_device(store: &Store, device_id: i64) -> Result<Device, DeviceError> {
    let device = find_device(store, device_id)?;
    store.remove_device(device_id)?;
    Ok(device)
}

/// Outcome of activate / deactivate.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    /// The flag was flipped.
    Changed(Device),
    /// The device was already in the requested state.
    Unchanged(Device),
}

/// Set a device's `active` flag.
pub fn set_active(store: &Store, device_id: i64, active: bool) -> Result<StateChange, DeviceError> {
    let mut device = find_device(store, device_id)?;
    if device.active == active {
        return Ok(StateChange::Unchanged(device));
    }
    store.set_device_active(device_id, active)?;
    device.active = active;
    Ok(StateChange::Changed(device))
}

/// Look up a device that is both registered and active.
pub fn find_active_device(store: &Store, device_id: i64) -> Result<Device, DeviceError> {
    store
        .get_device(device_id)?
        .filter(|d| d.active)
        .ok_or(DeviceError::NotActive(device_id))
}

/// Fetch once from an active device. `None` means no data was received.
pub async fn test_device(
    factory: &AdapterFactory,
    device: &Device,
) -> Result<Option<Measurement>, DeviceError> {
    if !device.active {
        return Err(DeviceError::NotActive(device.id));
    }
    let adapter = factory.create(device).map_err(DeviceError::Config)?;
    Ok(adapter.fetch_data().await)
}

/// Message printed when `device list` has nothing to show.
pub fn empty_list_message(all: bool) -> &'static str {
    if all {
        "No devices configured."
    } else {
        "No active devices. Use --all to see inactive devices."
    }
}

/// Render devices as a table: ID, Name, Provider, Status, Created.
pub fn render_device_table(devices: &[Device]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["ID", "Name", "Provider", "Status", "Created"]);

    for device in devices {
        let status = if device.active { "Active" } else { "Inactive" };
        let created = device
            .created_at
            .and_then(|ts| ts.format(format_description!("[year]-[month]-[day]")).ok())
            .unwrap_or_else(|| "Unknown".to_string());
        builder.push_record([
            device.id.to_string(),
            device.name.clone(),
            device.provider.clone(),
            status.to_string(),
            created,
        ]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}
