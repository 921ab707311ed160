use crate::drivers::VendorDriver;
use crate::error::Result;
use crate::registry::DriverRegistry;
use crate::types::{
    CameraEvent, ConnectionConfig, DeviceInfo, DriverOptions, PtzCommand, Snapshot, StreamRequest,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Instant;
use tracing::debug;

/// Vendor-neutral handle on one camera.
///
/// Owns exactly one driver, chosen from the registry by `config.vendor`. Every method
/// delegates straight to that driver; results and errors are returned untouched.
pub struct CameraAdapter {
    driver: Box<dyn VendorDriver>,
}

impl CameraAdapter {
    /// Build an adapter using the built-in driver registry and default options
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_registry(config, DriverRegistry::builtin(), &DriverOptions::default())
    }

    pub fn with_options(config: ConnectionConfig, options: &DriverOptions) -> Result<Self> {
        Self::with_registry(config, DriverRegistry::builtin(), options)
    }

    pub fn with_registry(
        config: ConnectionConfig,
        registry: &DriverRegistry,
        options: &DriverOptions,
    ) -> Result<Self> {
        let vendor = config.vendor.clone();
        let driver = registry.create(config, options)?;
        debug!(vendor = %vendor, "camera adapter created");
        Ok(Self { driver })
    }

    /// Wrap an already constructed driver
    pub fn from_driver(driver: Box<dyn VendorDriver>) -> Self {
        Self { driver }
    }

    pub fn vendor(&self) -> &str {
        self.driver.vendor()
    }

    pub fn driver(&self) -> &dyn VendorDriver {
        self.driver.as_ref()
    }

    /// Resolve a playback URL. Never fails; see [`CameraAdapter::test_connection`].
    pub fn get_stream(&self, request: &StreamRequest) -> String {
        self.driver.stream_url(request)
    }

    pub async fn control_ptz(&self, command: &PtzCommand) -> Result<()> {
        self.observe("control_ptz", self.driver.control_ptz(command)).await
    }

    pub async fn get_snapshot(&self, channel: u32) -> Result<Snapshot> {
        self.observe("get_snapshot", self.driver.snapshot(channel)).await
    }

    pub async fn start_recording(&self, channel: u32) -> Result<()> {
        self.observe("start_recording", self.driver.start_recording(channel)).await
    }

    pub async fn stop_recording(&self, channel: u32) -> Result<()> {
        self.observe("stop_recording", self.driver.stop_recording(channel)).await
    }

    pub async fn get_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CameraEvent>> {
        self.observe("get_events", self.driver.events(start, end)).await
    }

    pub async fn get_device_info(&self) -> Result<DeviceInfo> {
        self.observe("get_device_info", self.driver.device_info()).await
    }

    /// Connectivity probe for "test connection" flows.
    pub async fn test_connection(&self) -> Result<DeviceInfo> {
        self.observe("test_connection", self.driver.device_info()).await
    }

    async fn observe<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        telemetry::metrics::observe_camera_request(
            self.driver.vendor(),
            operation,
            status,
            started.elapsed(),
        );
        result
    }
}
