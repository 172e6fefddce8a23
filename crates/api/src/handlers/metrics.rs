use actix_web::{web::Data, HttpResponse};

use crate::state::AppState;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4";

/// Prometheus exposition of every counter the session and the routes record.
pub async fn metrics_handler(state: Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(PROMETHEUS_TEXT)
        .body(state.telemetry().render_metrics())
}
