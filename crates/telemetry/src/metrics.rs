#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Camera Driver Metrics ====
    pub static ref CAMERA_REQUESTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "camera_requests_total",
                "Total number of camera operations by outcome",
            ),
            &["vendor", "operation", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAMERA_REQUEST_DURATION: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "camera_request_duration_seconds",
                "Duration of camera operations including authentication round trips",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["vendor", "operation"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAMERA_LOGINS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new("camera_logins_total", "Total number of session logins"),
            &["vendor", "result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAMERA_SESSION_RENEWALS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "camera_session_renewals_total",
                "Total number of sessions renewed after the device rejected them",
            ),
            &["vendor"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Record one camera operation.
pub fn observe_camera_request(vendor: &str, operation: &str, status: &str, elapsed: Duration) {
    CAMERA_REQUESTS
        .with_label_values(&[vendor, operation, status])
        .inc();
    CAMERA_REQUEST_DURATION
        .with_label_values(&[vendor, operation])
        .observe(elapsed.as_secs_f64());
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&REGISTRY.gather(), &mut buf).ok();
    String::from_utf8(buf).unwrap_or_default()
}
