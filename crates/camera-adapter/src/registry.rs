use crate::drivers::{dahua, hikvision, DahuaDriver, HikvisionDriver, VendorDriver};
use crate::error::{CameraError, Result};
use crate::types::{ConnectionConfig, DriverOptions};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Builds a driver for one camera.
pub type DriverFactory =
    Arc<dyn Fn(ConnectionConfig, &DriverOptions) -> Result<Box<dyn VendorDriver>> + Send + Sync>;

/// Maps vendor names (case-insensitive) to driver factories.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Hikvision and Dahua drivers
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(hikvision::VENDOR, |config, options| {
            let driver: Box<dyn VendorDriver> = Box::new(HikvisionDriver::new(config, options)?);
            Ok(driver)
        });
        registry.register(dahua::VENDOR, |config, options| {
            let driver: Box<dyn VendorDriver> = Box::new(DahuaDriver::new(config, options)?);
            Ok(driver)
        });
        registry
    }

    /// Process-wide built-in registry used by [`crate::CameraAdapter::new`].
    pub fn builtin() -> &'static DriverRegistry {
        static BUILTIN: OnceLock<DriverRegistry> = OnceLock::new();
        BUILTIN.get_or_init(DriverRegistry::with_builtin)
    }

    /// Register a vendor, replacing any previous factory under the same name
    pub fn register<F>(&mut self, vendor: &str, factory: F)
    where
        F: Fn(ConnectionConfig, &DriverOptions) -> Result<Box<dyn VendorDriver>> + Send + Sync + 'static,
    {
        let key = vendor.to_ascii_lowercase();
        tracing::debug!(vendor = %key, "registered camera driver");
        self.factories.insert(key, Arc::new(factory));
    }

    /// Check if a vendor is registered
    pub fn supports(&self, vendor: &str) -> bool {
        self.factories.contains_key(&vendor.to_ascii_lowercase())
    }

    /// Registered vendor names, sorted
    pub fn vendors(&self) -> Vec<String> {
        let mut vendors: Vec<String> = self.factories.keys().cloned().collect();
        vendors.sort();
        vendors
    }

    /// Construct the driver for `config.vendor`
    pub fn create(&self, config: ConnectionConfig, options: &DriverOptions) -> Result<Box<dyn VendorDriver>> {
        let factory = self
            .factories
            .get(&config.vendor.to_ascii_lowercase())
            .ok_or_else(|| CameraError::UnsupportedVendor(config.vendor.clone()))?;
        factory(config, options)
    }
}
