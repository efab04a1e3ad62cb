//! Device adapters for environmental sensor provider APIs.
//!
//! Every provider speaks its own protocol. This crate hides them behind the
//! [`DeviceAdapter`] trait and builds the right adapter for a registered
//! device through an [`AdapterFactory`] keyed by provider name.
//!
//! # Supported Providers
//!
//! | Provider | Adapter | Required config |
//! |----------|---------|-----------------|
//! | `airgradient` | [`AirGradientAdapter`] | `api_token`, `location_id` |
//!
//! # Quick Start
//!
//! ```no_run
//! use airq_core::{AdapterFactory, DeviceAdapter};
//! use airq_types::{Device, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ProviderConfig::new();
//!     config.insert("api_token".into(), "my-token".into());
//!     config.insert("location_id".into(), "12345".into());
//!     let device = Device::new(1, "Office", "airgradient", config);
//!
//!     let adapter = AdapterFactory::default().create(&device)?;
//!     if let Some(reading) = adapter.fetch_data().await {
//!         println!("{}", reading);
//!     }
//!     Ok(())
//! }
//! ```

pub mod airgradient;
pub mod error;
pub mod factory;
pub mod mock;
pub mod traits;

pub use airgradient::AirGradientAdapter;
pub use error::{Error, Result};
pub use factory::{AdapterConstructor, AdapterFactory};
pub use mock::{MOCK_PROVIDER, MockAdapter};
pub use traits::{AdapterOptions, DEFAULT_FETCH_TIMEOUT, DeviceAdapter};

// Re-export types for convenience
pub use airq_types as types;
