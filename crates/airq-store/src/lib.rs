//! SQLite persistence for airq.
//!
//! This crate holds the device registry and the append-only measurement
//! time series in one SQLite database.
//!
//! # Features
//!
//! - Device registration with `max(id) + 1` id assignment
//! - Activation flags read fresh on every call
//! - Timestamps normalized to UTC with whole-second precision
//! - Latest-by-device and windowed-history queries
//! - WAL mode, so the poller and request handlers can use separate connections
//!
//! # Example
//!
//! ```no_run
//! use airq_store::{MeasurementQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! for device in store.list_active_devices()? {
//!     if let Some(row) = store.latest_measurement(Some(device.id))? {
//!         println!("{}: CO2 {:?}", row.device_name, row.co2);
//!     }
//! }
//!
//! let recent = store.query_measurements(&MeasurementQuery::new().limit(10))?;
//! # Ok::<(), airq_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{NewDevice, StoredMeasurement, format_db_timestamp, parse_db_timestamp};
pub use queries::MeasurementQuery;
pub use schema::SCHEMA_VERSION;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/airq/airq.db`
/// - macOS: `~/Library/Application Support/airq/airq.db`
/// - Windows: `C:\Users\<user>\AppData\Local\airq\airq.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airq")
        .join("airq.db")
}
