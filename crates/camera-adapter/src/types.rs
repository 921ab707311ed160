use crate::error::{CameraError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_PTZ_SPEED: u32 = 5;
pub const DEFAULT_CHANNEL: u32 = 1;

/// Connection details for a single camera, taken from the persisted camera record.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub ip: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub vendor: String,
}

impl ConnectionConfig {
    pub fn new(
        ip: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        vendor: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            ip: ip.into(),
            port,
            username: username.into(),
            password: password.into(),
            vendor: vendor.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants a driver relies on. Deserialized configs bypass `new`,
    /// so drivers call this again at construction.
    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(CameraError::invalid_argument("ip must not be empty"));
        }
        if self.port == 0 {
            return Err(CameraError::invalid_argument("port must be between 1 and 65535"));
        }
        if self.vendor.trim().is_empty() {
            return Err(CameraError::invalid_argument("vendor must not be empty"));
        }
        Ok(())
    }

    /// `http://ip:port` base for device control requests.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    /// `rtsp://user:pass@ip:port` prefix for playback URLs. Credentials are
    /// percent-encoded so reserved characters cannot break the authority.
    pub(crate) fn rtsp_base(&self) -> String {
        let host = if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]", self.ip)
        } else {
            self.ip.clone()
        };

        let mut url = match Url::parse(&format!("rtsp://{}:{}", host, self.port)) {
            Ok(url) => url,
            Err(_) => return format!("rtsp://{}:{}", host, self.port),
        };
        if url.set_username(&self.username).is_err()
            || url.set_password(Some(&self.password)).is_err()
        {
            return format!("rtsp://{}:{}", host, self.port);
        }
        url.as_str().trim_end_matches('/').to_string()
    }
}

// Keeps the password out of logs and panic messages.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("vendor", &self.vendor)
            .finish()
    }
}

/// Per-driver HTTP behaviour.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Upper bound for a single HTTP exchange with the device
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl DriverOptions {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| CameraError::connection(format!("failed to build http client: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtzDirection {
    Up,
    Down,
    Left,
    Right,
    Stop,
}

impl PtzDirection {
    pub const ALL: [PtzDirection; 5] = [
        PtzDirection::Up,
        PtzDirection::Down,
        PtzDirection::Left,
        PtzDirection::Right,
        PtzDirection::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PtzDirection::Up => "up",
            PtzDirection::Down => "down",
            PtzDirection::Left => "left",
            PtzDirection::Right => "right",
            PtzDirection::Stop => "stop",
        }
    }
}

impl fmt::Display for PtzDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PtzDirection {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(PtzDirection::Up),
            "down" => Ok(PtzDirection::Down),
            "left" => Ok(PtzDirection::Left),
            "right" => Ok(PtzDirection::Right),
            "stop" => Ok(PtzDirection::Stop),
            _ => Err(CameraError::UnsupportedCommand(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtzCommand {
    pub direction: PtzDirection,
    pub speed: u32,
    pub channel: u32,
}

impl PtzCommand {
    pub fn new(direction: PtzDirection, speed: u32, channel: u32) -> Result<Self> {
        let command = Self {
            direction,
            speed,
            channel,
        };
        command.validate()?;
        Ok(command)
    }

    /// Parses a direction name from the UI, e.g. `"left"`, with default speed and channel.
    pub fn parse(direction: &str) -> Result<Self> {
        Self::new(direction.parse()?, DEFAULT_PTZ_SPEED, DEFAULT_CHANNEL)
    }

    pub fn with_speed(mut self, speed: u32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.speed == 0 {
            return Err(CameraError::invalid_argument("ptz speed must be positive"));
        }
        validate_channel(self.channel)
    }
}

pub(crate) fn validate_channel(channel: u32) -> Result<()> {
    if channel == 0 {
        return Err(CameraError::invalid_argument("channel must be positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProfile {
    #[default]
    Main,
    Sub,
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamProfile::Main => f.write_str("main"),
            StreamProfile::Sub => f.write_str("sub"),
        }
    }
}

impl FromStr for StreamProfile {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(StreamProfile::Main),
            "sub" => Ok(StreamProfile::Sub),
            _ => Err(CameraError::invalid_argument(format!("unknown stream profile: {}", s))),
        }
    }
}

/// Playback request. Channels are numbered from 1, so a zero channel cannot be
/// built or deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub channel: NonZeroU32,
    #[serde(default)]
    pub profile: StreamProfile,
}

impl StreamRequest {
    pub fn new(channel: u32, profile: StreamProfile) -> Result<Self> {
        let channel = NonZeroU32::new(channel)
            .ok_or_else(|| CameraError::invalid_argument("channel must be positive"))?;
        Ok(Self { channel, profile })
    }

    pub fn main(channel: u32) -> Result<Self> {
        Self::new(channel, StreamProfile::Main)
    }

    pub fn sub(channel: u32) -> Result<Self> {
        Self::new(channel, StreamProfile::Sub)
    }
}

/// Raw still image returned by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Device metadata normalised across vendors. `attributes` keeps every field the
/// device reported, keyed by the vendor's own name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub vendor: String,
    pub device_name: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

/// Entry from the device's own event/alarm log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEvent {
    /// Timestamp as reported by the device (device-local clock)
    pub time: String,
    pub kind: String,
    pub channel: Option<u32>,
    pub description: Option<String>,
}
