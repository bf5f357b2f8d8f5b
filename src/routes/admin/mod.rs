use axum::extract::{Path, Query, State};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::middleware::auth::{require_admin_view, require_alert_resolution};
use crate::response::{ok, AppError};
use crate::services::alerts::Alert;
use crate::services::dashboard::AdminDashboard;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 200;

pub fn router() -> Router<AppState> {
    let view = Router::new()
        .route("/dashboard", get(admin_dashboard))
        .route("/alerts", get(list_alerts))
        .route_layer(middleware::from_fn(require_admin_view));

    let resolve = Router::new()
        .route("/alerts/:id/resolve", put(resolve_alert))
        .route_layer(middleware::from_fn(require_alert_resolution));

    view.merge(resolve)
}

async fn admin_dashboard(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let store = state.store();
    let alerts = state.alerts();
    Ok(ok(AdminDashboard::load(store.as_ref(), &alerts).await))
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertsResponse {
    active: Vec<Alert>,
    history: Vec<Alert>,
}

async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let alerts = state.alerts();
    Ok(ok(AlertsResponse {
        active: alerts.active(),
        history: alerts.history(limit),
    }))
}

async fn resolve_alert(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(alert_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let resolved = state
        .alerts()
        .resolve(&alert_id)
        .ok_or_else(|| AppError::not_found("Alert not found or already resolved"))?;
    tracing::info!(alert_id = %resolved.id, resolved_by = %user.id, "alert resolved");
    Ok(ok(resolved))
}
