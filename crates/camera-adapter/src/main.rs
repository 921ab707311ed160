use anyhow::{Context, Result};
use camera_adapter::config::redact_credentials;
use camera_adapter::{CameraAdapter, ProbeConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_with_service("camera-probe");

    let config = ProbeConfig::from_env()?;
    info!(
        vendor = %config.connection.vendor,
        ip = %config.connection.ip,
        port = config.connection.port,
        "probing camera"
    );

    let adapter = CameraAdapter::with_options(config.connection.clone(), &config.options)
        .context("failed to create camera adapter")?;

    let info = match adapter.test_connection().await {
        Ok(info) => info,
        Err(e) => {
            error!(vendor = %adapter.vendor(), error = %e, "camera unreachable");
            return Err(e.into());
        }
    };

    info!(
        vendor = %info.vendor,
        device_name = ?info.device_name,
        model = ?info.model,
        serial_number = ?info.serial_number,
        firmware_version = ?info.firmware_version,
        "camera online"
    );

    let main_url = adapter.get_stream(&config.main_stream());
    let sub_url = adapter.get_stream(&config.sub_stream());
    info!(
        channel = config.channel.get(),
        main = %redact_credentials(&main_url),
        sub = %redact_credentials(&sub_url),
        "resolved stream urls"
    );

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
