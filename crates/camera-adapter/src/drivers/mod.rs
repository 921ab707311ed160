pub mod dahua;
pub mod hikvision;

pub use dahua::{DahuaDriver, DahuaSession};
pub use hikvision::{HikvisionDriver, PtzVector};

use crate::error::{CameraError, Result};
use crate::types::{CameraEvent, DeviceInfo, PtzCommand, Snapshot, StreamRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;

/// Capability contract every camera vendor integration implements.
///
/// Drivers own their credentials and any session state; callers only ever see the
/// uniform signatures below and the shared [`CameraError`] taxonomy.
#[async_trait]
pub trait VendorDriver: Send + Sync {
    /// Registry key of the vendor this driver speaks to
    fn vendor(&self) -> &str;

    /// Build the RTSP playback URL. Pure; connectivity is checked via `device_info`.
    fn stream_url(&self, request: &StreamRequest) -> String;

    /// Start or stop continuous pan/tilt movement
    async fn control_ptz(&self, command: &PtzCommand) -> Result<()>;

    /// Fetch a still image from the given channel
    async fn snapshot(&self, channel: u32) -> Result<Snapshot>;

    async fn start_recording(&self, channel: u32) -> Result<()>;

    async fn stop_recording(&self, channel: u32) -> Result<()>;

    /// Search the device log between two instants
    async fn events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CameraEvent>>;

    /// Device metadata; also serves as the connectivity probe
    async fn device_info(&self) -> Result<DeviceInfo>;
}

/// Turn a non-2xx response into [`CameraError::Device`].
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CameraError::Device {
        status: status.as_u16(),
        body,
    })
}

pub(crate) async fn read_text(response: Response) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| CameraError::connection(format!("failed to read response body: {}", e)))
}

pub(crate) async fn read_snapshot(response: Response) -> Result<Snapshot> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let data = response
        .bytes()
        .await
        .map_err(|e| CameraError::connection(format!("failed to read snapshot body: {}", e)))?;

    Ok(Snapshot {
        content_type,
        data: data.to_vec(),
    })
}
