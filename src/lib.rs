//! Camera vendor integration layer.
//!
//! Re-exports the adapter crate so callers depend on a single package; the
//! workspace-level integration tests live alongside this crate.

pub use camera_adapter::*;
pub use telemetry;
