use std::time::{Duration, Instant};

use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use tracing::info;

use sniper_domain::model::{BroadcastResult, SessionStatus};

use crate::state::AppState;

use super::{ApiError, Envelope};

#[derive(Debug, Clone, Copy, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
enum Route {
    Start,
    Stop,
    Status,
    QuickCheck,
    Snipe,
    Broadcasts,
    Clear,
}

fn count(route: Route, outcome: &'static str) {
    let route: &'static str = route.into();
    counter!("api_sniper_requests_total", "route" => route, "outcome" => outcome).increment(1);
}

fn track<T>(route: Route, result: Result<T, ApiError>) -> Result<T, ApiError> {
    count(route, if result.is_ok() { "ok" } else { "rejected" });
    result
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub target_address: String,
    pub serialized_data: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickCheckRequest {
    pub target_address: String,
    pub serialized_data: String,
    #[serde(default)]
    pub timeout_ms: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartData {
    pub target_address: String,
    pub check_interval: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickCheckResponse {
    pub success: bool,
    pub detected: bool,
    #[serde(rename = "detectedTxIDs")]
    pub detected_tx_ids: Vec<String>,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnipeResponse {
    pub success: bool,
    pub detected: bool,
    #[serde(rename = "targetTxIDs")]
    pub target_tx_ids: Vec<String>,
    #[serde(rename = "broadcastTxIDs")]
    pub broadcast_tx_ids: Vec<String>,
    pub broadcast_count: usize,
    pub response_time_ms: u64,
}

/// JSON extractor settings: malformed bodies and missing fields are answered
/// with the error envelope instead of actix's plain-text default.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        ApiError::InvalidRequest(err.to_string()).into()
    })
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

pub async fn start_handler(
    state: web::Data<AppState>,
    payload: web::Json<StartRequest>,
) -> Result<HttpResponse, ApiError> {
    track(Route::Start, start(&state, payload.into_inner()))
}

fn start(state: &AppState, request: StartRequest) -> Result<HttpResponse, ApiError> {
    require("targetAddress", &request.target_address)?;
    require("serializedData", &request.serialized_data)?;

    let session = state.session();
    session.start(request.target_address.clone(), request.serialized_data)?;

    let interval = session.settings().poll_interval();
    Ok(HttpResponse::Ok().json(Envelope::ok(
        Some("Sniper monitoring started"),
        Some(StartData {
            target_address: request.target_address,
            check_interval: format!("{}ms", interval.as_millis()),
        }),
    )))
}

pub async fn stop_handler(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let result = state
        .session()
        .stop()
        .map(|()| {
            HttpResponse::Ok().json(Envelope::<()>::ok(Some("Sniper monitoring stopped"), None))
        })
        .map_err(ApiError::from);
    track(Route::Stop, result)
}

pub async fn status_handler(state: web::Data<AppState>) -> HttpResponse {
    count(Route::Status, "ok");
    let status: SessionStatus = state.session().status();
    HttpResponse::Ok().json(Envelope::ok(None, Some(status)))
}

pub async fn quick_check_handler(
    state: web::Data<AppState>,
    payload: web::Json<QuickCheckRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let validated = require("targetAddress", &request.target_address)
        .and_then(|()| require("serializedData", &request.serialized_data));
    track(Route::QuickCheck, validated)?;

    let session = state.session();
    let timeout = match request.timeout_ms {
        Some(ms) if ms > 0 => Duration::from_millis(ms as u64),
        _ => session.settings().quick_check_timeout(),
    };

    let started = Instant::now();
    let outcome = session
        .quick_check(&request.target_address, request.serialized_data, timeout)
        .await;
    let response_time_ms = elapsed_ms(started);

    info!(
        address = %request.target_address,
        detected = outcome.detected,
        response_time_ms,
        "quick check served"
    );
    Ok(HttpResponse::Ok().json(QuickCheckResponse {
        success: true,
        detected: outcome.detected,
        detected_tx_ids: outcome.tx_ids,
        response_time_ms,
    }))
}

/// Quick check with the default timeout that also waits for the broadcasts it
/// launched, so the reply carries the node verdicts.
pub async fn snipe_handler(
    state: web::Data<AppState>,
    payload: web::Json<StartRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let validated = require("targetAddress", &request.target_address)
        .and_then(|()| require("serializedData", &request.serialized_data));
    track(Route::Snipe, validated)?;

    let session = state.session();
    let started = Instant::now();
    let outcome = session
        .snipe(
            &request.target_address,
            request.serialized_data,
            session.settings().quick_check_timeout(),
        )
        .await;
    let response_time_ms = elapsed_ms(started);

    let broadcasts = session.broadcast_results();
    let broadcast_tx_ids = accepted_tx_ids(&broadcasts);
    info!(
        address = %request.target_address,
        detected = outcome.detected,
        accepted = broadcast_tx_ids.len(),
        response_time_ms,
        "snipe served"
    );
    Ok(HttpResponse::Ok().json(SnipeResponse {
        success: true,
        detected: outcome.detected,
        target_tx_ids: outcome.tx_ids,
        broadcast_tx_ids,
        broadcast_count: broadcasts.len(),
        response_time_ms,
    }))
}

fn accepted_tx_ids(results: &[BroadcastResult]) -> Vec<String> {
    results
        .iter()
        .filter(|result| result.success && !result.tx_id.is_empty())
        .map(|result| result.tx_id.clone())
        .collect()
}

pub async fn broadcasts_handler(state: web::Data<AppState>) -> HttpResponse {
    count(Route::Broadcasts, "ok");
    HttpResponse::Ok().json(Envelope::ok(None, Some(state.session().broadcast_results())))
}

pub async fn clear_broadcasts_handler(state: web::Data<AppState>) -> HttpResponse {
    count(Route::Clear, "ok");
    state.session().clear_results();
    HttpResponse::Ok().json(Envelope::<()>::ok(Some("Results cleared"), None))
}

/// CORS preflight.
pub async fn preflight_handler() -> HttpResponse {
    HttpResponse::NoContent().finish()
}
