//! Domain-level building blocks shared across the API and monitor crates:
//! the sniper data model, environment configuration and telemetry wiring.

pub mod config;
pub mod model;
pub mod services;

pub use config::{ApiConfig, ConfigError, MonitorConfig, SniperSettings};
pub use model::*;
