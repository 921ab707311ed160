use thiserror::Error;

pub type Result<T> = std::result::Result<T, CameraError>;

/// Errors surfaced by vendor drivers and passed through the adapter unchanged.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Transport failure or timeout while talking to the device.
    #[error("connection error: {0}")]
    Connection(String),

    /// Login or digest challenge could not be completed.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Session still rejected after one renewal attempt.
    #[error("session error: {0}")]
    Session(String),

    /// Device answered with a non-2xx status.
    #[error("device error: {status} - {body}")]
    Device { status: u16, body: String },

    #[error("unsupported vendor: {0}")]
    UnsupportedVendor(String),

    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Device answered 2xx but the payload could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CameraError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Status label used for request metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::Connection(_) => "connection",
            CameraError::Authentication(_) => "authentication",
            CameraError::Session(_) => "session",
            CameraError::Device { .. } => "device",
            CameraError::UnsupportedVendor(_) => "unsupported_vendor",
            CameraError::UnsupportedCommand(_) => "unsupported_command",
            CameraError::InvalidArgument(_) => "invalid_argument",
            CameraError::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl From<reqwest::Error> for CameraError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CameraError::connection(format!("request timed out: {}", err))
        } else {
            CameraError::connection(err.to_string())
        }
    }
}
