pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod learning;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod workers;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::state::AppState;

/// Router for the given state with the HTTP layers the server uses.
pub fn create_app_with(state: AppState) -> axum::Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub fn create_app(config: Config) -> axum::Router {
    create_app_with(AppState::from_config(config))
}
