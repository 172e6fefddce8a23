//! Headless sniper: watches one target address and races its payload to the
//! broadcast nodes until interrupted.

use std::io;

use sniper_domain::{
    services::telemetry::{init_telemetry, TelemetryConfig},
    MonitorConfig,
};
use sniper_monitor::{run_monitor, MonitorError};

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = MonitorConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    init_telemetry(&telemetry_config)?;
    run_monitor(config).await
}
