use crate::types::{ConnectionConfig, DriverOptions, StreamProfile, StreamRequest};
use anyhow::{Context, Result};
use std::env;
use std::num::NonZeroU32;
use std::time::Duration;

/// Settings for the `camera-probe` binary, read from the environment.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub connection: ConnectionConfig,
    pub channel: NonZeroU32,
    pub options: DriverOptions,
}

impl ProbeConfig {
    pub fn from_env() -> Result<Self> {
        let vendor = env::var("CAMERA_VENDOR").context("CAMERA_VENDOR environment variable required")?;
        let ip = env::var("CAMERA_IP").context("CAMERA_IP environment variable required")?;

        let port = match env::var("CAMERA_PORT") {
            Ok(raw) => raw.parse::<u16>().context("invalid CAMERA_PORT")?,
            Err(_) => 80,
        };

        let username = env::var("CAMERA_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let password = env::var("CAMERA_PASSWORD").unwrap_or_default();

        let channel = env::var("CAMERA_CHANNEL")
            .ok()
            .and_then(|s| s.parse::<NonZeroU32>().ok())
            .unwrap_or(NonZeroU32::MIN);

        let timeout_secs = env::var("CAMERA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let connection = ConnectionConfig::new(ip, port, username, password, vendor)
            .context("invalid camera connection settings")?;

        Ok(Self {
            connection,
            channel,
            options: DriverOptions::default().with_request_timeout(Duration::from_secs(timeout_secs)),
        })
    }

    pub fn main_stream(&self) -> StreamRequest {
        StreamRequest {
            channel: self.channel,
            profile: StreamProfile::Main,
        }
    }

    pub fn sub_stream(&self) -> StreamRequest {
        StreamRequest {
            channel: self.channel,
            profile: StreamProfile::Sub,
        }
    }
}

/// Replace the `user:pass@` part of a playback URL before it is logged.
pub fn redact_credentials(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let rest = &url[scheme_end..];
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());

    // Userinfo ends at the last '@' of the authority; earlier ones belong to the password.
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}***@{}", &url[..scheme_end], &rest[at + 1..]),
        None => url.to_string(),
    }
}
