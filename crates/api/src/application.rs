//! Process wiring: configuration, telemetry, the session and the listeners.

use std::path::Path;
use std::sync::Arc;

#[cfg(unix)]
use std::fs;

use actix_web::{
    guard,
    middleware::{DefaultHeaders, Logger},
    web, App, HttpServer,
};
use thiserror::Error;
use tracing::info;

use sniper_domain::config::{ApiConfig, ConfigError};
use sniper_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use sniper_monitor::{HttpNodeClient, NodeClientError, SniperSession};

use crate::{
    handlers::{
        broadcasts_handler, clear_broadcasts_handler, json_config, metrics_handler,
        preflight_handler, quick_check_handler, snipe_handler, start_handler, status_handler,
        stop_handler,
    },
    state::AppState,
};

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let client = HttpNodeClient::build()?;
    let session = SniperSession::new(config.sniper().clone(), Arc::new(client));
    let state = AppState::new(session.clone(), telemetry);

    // With a dedicated internal listener, metrics stay off the public one.
    let include_metrics_on_public = !config.has_internal_listener();

    let public_state = state.clone();
    let mut public_server = HttpServer::new(move || {
        let app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .app_data(json_config())
            .wrap(Logger::default())
            .wrap(cors_headers())
            .configure(sniper_routes);

        if include_metrics_on_public {
            app.route("/metrics", web::get().to(metrics_handler))
        } else {
            app
        }
    });

    #[cfg(unix)]
    {
        if let Some(socket) = config.api_unix_socket() {
            cleanup_socket(socket)?;
            public_server = public_server.bind_uds(socket)?;
        } else {
            public_server = public_server.bind(config.api_bind_address())?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(socket) = config.api_unix_socket() {
            return Err(BootstrapError::Io(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            ))));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    let public_server = public_server.run();

    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .route("/metrics", web::get().to(metrics_handler))
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "internal unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        Some(internal_server.run())
    } else {
        None
    };

    info!(
        query_endpoints = config.sniper().query_endpoints().len(),
        broadcast_endpoints = config.sniper().broadcast_endpoints().len(),
        "sniper api listening"
    );

    let served = if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal).map(|_| ())
    } else {
        public_server.await
    };

    // The servers are gone; unwind the loop and any pending broadcasts.
    session.shutdown().await;
    served?;
    Ok(())
}

/// Registers the sniper routes. Shared with the handler tests.
pub fn sniper_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/v1/sniper/{tail:.*}")
            .guard(guard::Options())
            .to(preflight_handler),
    )
    .route(
        "/api/v1/sniper/start-continuous",
        web::post().to(start_handler),
    )
    .route("/api/v1/sniper/stop-continuous", web::post().to(stop_handler))
    .route("/api/v1/sniper/status", web::get().to(status_handler))
    .route(
        "/api/v1/sniper/quick-check",
        web::post().to(quick_check_handler),
    )
    .route("/api/v1/sniper/snipe", web::post().to(snipe_handler))
    .route("/api/v1/sniper/broadcasts", web::get().to(broadcasts_handler))
    .route(
        "/api/v1/sniper/broadcasts/clear",
        web::post().to(clear_broadcasts_handler),
    );
}

/// Permissive CORS headers set on every response.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Credentials", "true"))
        .add((
            "Access-Control-Allow-Headers",
            "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization, accept, origin, Cache-Control, X-Requested-With",
        ))
        .add((
            "Access-Control-Allow-Methods",
            "POST, OPTIONS, GET, PUT, DELETE, PATCH",
        ))
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("http client error: {0}")]
    Client(#[from] NodeClientError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Removes a stale unix socket left behind by an unclean exit, otherwise the
/// bind fails.
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn cleanup_socket(_path: &str) -> std::io::Result<()> {
    Ok(())
}
