use std::{env, sync::Arc};

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Shared observability options for binaries.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    log_target: bool,
}

impl TelemetryConfig {
    /// Loads telemetry knobs from optional environment variables prefixed with
    /// `<PREFIX>_`, e.g. `API_LOG_FILTER`. Missing entries fall back to
    /// defaults so binaries boot without extra configuration.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let upper = prefix.trim().to_ascii_uppercase();
        let log_key = format!("{}_LOG_FILTER", upper);
        let target_key = format!("{}_LOG_TARGET", upper);

        let log_filter = env::var(log_key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());
        let log_target = env::var(target_key)
            .ok()
            .map(|value| !matches!(value.trim(), "0" | "false" | "off"))
            .unwrap_or(true);

        Self {
            log_filter,
            log_target,
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn log_target(&self) -> bool {
        self.log_target
    }
}

/// Guard returned after telemetry initialization.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// Centralized helper to wire up tracing + the metrics recorder once per
/// process. Later calls reuse the first installation.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config)?;
    let metrics = install_metrics()?;

    Ok(TelemetryGuard { metrics })
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(config.log_target()))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }

    Ok(())
}

fn install_metrics() -> Result<Arc<PrometheusHandle>, TelemetryError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map(Arc::new)
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
            describe_sniper_metrics();
            Ok(handle)
        })
        .cloned()
}

fn describe_sniper_metrics() {
    describe_counter!(
        "sniper_poll_requests_total",
        "Mempool queries issued, labelled by outcome"
    );
    describe_histogram!(
        "sniper_poll_cycle_seconds",
        Unit::Seconds,
        "Wall-clock duration of one fan-out poll across all query endpoints"
    );
    describe_counter!(
        "sniper_detections_total",
        "Previously unseen target transactions detected"
    );
    describe_counter!(
        "sniper_broadcasts_total",
        "Broadcast submissions, labelled by outcome"
    );
    describe_counter!(
        "sniper_rate_limit_cancelled_total",
        "Rate limiter waits abandoned because of cancellation"
    );
    describe_counter!(
        "sniper_session_transitions_total",
        "Session lifecycle transitions, labelled by target state"
    );
    describe_gauge!(
        "sniper_session_running",
        "1 while the detect loop is running, 0 otherwise"
    );
    describe_counter!(
        "api_sniper_requests_total",
        "HTTP requests to the sniper routes, labelled by route and outcome"
    );
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
