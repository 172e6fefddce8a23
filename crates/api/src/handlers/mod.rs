pub mod metrics;
pub mod sniper;

pub use metrics::metrics_handler;
pub use sniper::{
    broadcasts_handler, clear_broadcasts_handler, json_config, preflight_handler,
    quick_check_handler, snipe_handler, start_handler, status_handler, stop_handler,
};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sniper_monitor::SessionError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Session(SessionError::ShutDown) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Session(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(Envelope::<()>::failure(self.to_string()))
    }
}

/// Response wrapper shared by every JSON route.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(message: Option<&str>, data: Option<T>) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}
