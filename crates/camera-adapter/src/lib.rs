pub mod adapter;
pub mod config;
pub mod digest;
pub mod drivers;
pub mod error;
pub mod payload;
pub mod registry;
pub mod types;

pub use adapter::CameraAdapter;
pub use config::ProbeConfig;
pub use digest::{CnonceSource, DigestChallenge, FixedCnonce, RandomCnonce};
pub use drivers::{DahuaDriver, DahuaSession, HikvisionDriver, PtzVector, VendorDriver};
pub use error::{CameraError, Result};
pub use registry::{DriverFactory, DriverRegistry};
pub use types::*;
