//! Background poller, query API and device management for airq.
//!
//! This crate provides a service that:
//! - Polls every active device once per interval and stores the readings
//! - Answers current and windowed-history queries over HTTP
//! - Manages the device registry from the command line
//!
//! # REST API Endpoints
//!
//! - `GET /health` - Liveness check; also starts the poller if needed
//! - `GET /debug` - Server UTC clock and the newest stored rows
//! - `GET /api/devices` - Active devices, by name
//! - `GET /api/current[/{device_id}]` - Latest reading
//! - `GET /api/history/{hours}[/{device_id}]` - Readings from the last 1-168 hours
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/airq/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5001"
//!
//! [storage]
//! path = "~/.local/share/airq/airq.db"
//!
//! [collector]
//! enabled = true
//! interval_secs = 60
//! fetch_timeout_secs = 10
//! ```

pub mod api;
pub mod collector;
pub mod config;
pub mod devices;
pub mod query;
pub mod state;

pub use collector::{Poller, TickReport, ensure_started};
pub use config::{
    CollectorConfig, Config, ConfigError, ConfigOverrides, ServerConfig, StorageConfig,
    ValidationError,
    default_config_path,
};
pub use query::QueryError;
pub use state::{AppState, CollectorState};
