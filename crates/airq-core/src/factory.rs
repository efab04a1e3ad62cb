//! Provider-keyed adapter construction.
//!
//! [`AdapterFactory`] maps provider names to constructors. Adding a provider
//! means registering one constructor; nothing else in the system changes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use airq_types::{Device, Provider};

use crate::airgradient::AirGradientAdapter;
use crate::error::{Error, Result};
use crate::traits::{AdapterOptions, DeviceAdapter};

/// Builds an adapter for one device.
pub type AdapterConstructor =
    Arc<dyn Fn(&Device, &AdapterOptions) -> Result<Box<dyn DeviceAdapter>> + Send + Sync>;

/// Registry of adapter constructors keyed by provider name.
///
/// # Example
///
/// ```
/// use airq_core::AdapterFactory;
/// use airq_types::{Device, ProviderConfig};
///
/// let factory = AdapterFactory::default();
/// let device = Device::new(1, "Attic", "purpleair", ProviderConfig::new());
/// assert!(factory.create(&device).is_err());
/// ```
#[derive(Clone)]
pub struct AdapterFactory {
    constructors: HashMap<String, AdapterConstructor>,
    options: AdapterOptions,
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("providers", &self.providers())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for AdapterFactory {
    fn default() -> Self {
        Self::with_builtin(AdapterOptions::default())
    }
}

impl AdapterFactory {
    /// An empty factory: every provider is unknown until registered.
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            constructors: HashMap::new(),
            options,
        }
    }

    /// A factory with every built-in provider registered.
    pub fn with_builtin(options: AdapterOptions) -> Self {
        let mut factory = Self::new(options);
        factory.register(Provider::AirGradient.as_str(), |device, options| {
            Ok(Box::new(AirGradientAdapter::new(device, options)?))
        });
        factory
    }

    /// Register (or replace) the constructor for a provider name.
    pub fn register<F>(&mut self, provider: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&Device, &AdapterOptions) -> Result<Box<dyn DeviceAdapter>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(provider.into(), Arc::new(constructor));
        self
    }

    /// Build the adapter for a device.
    ///
    /// Fails with [`Error::UnknownProvider`] when no constructor is registered
    /// for `device.provider`, or with the constructor's own configuration error.
    pub fn create(&self, device: &Device) -> Result<Box<dyn DeviceAdapter>> {
        let constructor =
            self.constructors
                .get(&device.provider)
                .ok_or_else(|| Error::UnknownProvider {
                    provider: device.provider.clone(),
                    supported: self.providers().join(", "),
                })?;
        constructor(device, &self.options)
    }

    /// Whether a constructor is registered for the provider name.
    pub fn supports(&self, provider: &str) -> bool {
        self.constructors.contains_key(provider)
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Options passed to every constructor.
    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }
}
