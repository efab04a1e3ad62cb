//! Shared types for airq environmental sensor polling.
//!
//! This crate holds the canonical shapes every other airq crate agrees on:
//!
//! - [`Measurement`]: the normalized reading every device adapter produces
//! - [`Device`]: a registered device with its provider configuration
//! - [`Provider`]: the providers with a built-in adapter
//! - timestamp helpers that turn provider instants into UTC wall-clock time
//!
//! # Example
//!
//! ```
//! use airq_types::{Measurement, parse_timestamp, to_utc_seconds};
//!
//! let ts = parse_timestamp("2024-01-01T00:00:00Z")?;
//! let reading = Measurement {
//!     co2: Some(612),
//!     ..Measurement::new(1).with_timestamp(ts)
//! };
//! assert_eq!(to_utc_seconds(ts)?, time::macros::datetime!(2024-01-01 00:00:00));
//! assert_eq!(reading.co2, Some(612));
//! # Ok::<(), airq_types::ParseError>(())
//! ```

pub mod error;
pub mod timestamp;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use timestamp::{parse_timestamp, to_utc_seconds};
pub use types::{Device, DeviceDescriptor, Measurement, Provider, ProviderConfig};
