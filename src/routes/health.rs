use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::services::experience::RecorderStats;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/live", get(live))
        .route("/info", get(info))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthInfoResponse {
    service: &'static str,
    version: &'static str,
    start_time: String,
    uptime: u64,
    llm_configured: bool,
    active_sessions: usize,
    active_alerts: usize,
    cached_completions: usize,
    recorder: RecorderStats,
}

async fn root(State(state): State<AppState>) -> Response {
    let store_ok = match state.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "data store health check failed");
            false
        }
    };

    let response = HealthResponse {
        status: if store_ok { "ok" } else { "degraded" },
        store: if store_ok { "connected" } else { "disconnected" },
        timestamp: now_iso(),
    };
    let status_code = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
    })
    .into_response()
}

async fn info(State(state): State<AppState>) -> Response {
    let start_time: DateTime<Utc> = state.started_at_system().into();
    Json(HealthInfoResponse {
        service: "tutor-backend",
        version: env!("CARGO_PKG_VERSION"),
        start_time: start_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.uptime_seconds(),
        llm_configured: state.llm_configured(),
        active_sessions: state.tutor().active_sessions(),
        active_alerts: state.alerts().active_count(),
        cached_completions: state.completion_cache().len(),
        recorder: state.recorder().stats(),
    })
    .into_response()
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
