mod admin;
mod dashboard;
mod health;
mod lessons;
mod tutor;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::middleware::auth::require_auth;
use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let auth = || middleware::from_fn_with_state(state.clone(), require_auth);

    Router::new()
        .nest("/health", health::router())
        .nest("/api/tutor", tutor::router().layer(auth()))
        .nest("/api/lessons", lessons::router().layer(auth()))
        .nest("/api/dashboard", dashboard::router().layer(auth()))
        .nest("/api/admin", admin::router().layer(auth()))
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Endpoint not found").into_response()
}
