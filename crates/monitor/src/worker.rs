//! Headless runner: one monitoring session driven from configuration until
//! the process is interrupted.

use thiserror::Error;
use tracing::{info, warn};

use sniper_domain::{config::ConfigError, services::telemetry::TelemetryError, MonitorConfig};

use crate::{
    rpc::{HttpNodeClient, NodeClientError},
    session::{SessionError, SniperSession},
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("http client error: {0}")]
    Client(#[from] NodeClientError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}

/// Builds a session over HTTP from `config`.
pub fn build_session(config: &MonitorConfig) -> Result<SniperSession, MonitorError> {
    let client = HttpNodeClient::build()?;
    Ok(SniperSession::new(
        config.sniper().clone(),
        std::sync::Arc::new(client),
    ))
}

/// Starts monitoring the configured target and blocks until Ctrl-C, then
/// shuts the session down and logs what it achieved.
pub async fn run_monitor(config: MonitorConfig) -> Result<(), MonitorError> {
    let session = build_session(&config)?;
    session.start(config.target_address(), config.payload())?;

    let interrupted = tokio::signal::ctrl_c().await;
    session.shutdown().await;

    let status = session.status();
    let accepted = session
        .broadcast_results()
        .iter()
        .filter(|result| result.success)
        .count();
    info!(
        address = %status.target_address,
        detected = status.detected_count,
        broadcasts = status.broadcast_count,
        accepted,
        "monitor stopped"
    );
    if accepted == 0 && status.detected_count > 0 {
        warn!("target transactions were detected but no node accepted the payload");
    }

    interrupted?;
    Ok(())
}
