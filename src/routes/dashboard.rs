use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};

use crate::auth::AuthUser;
use crate::response::{ok, AppError};
use crate::services::dashboard::UserDashboard;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(user_dashboard))
}

async fn user_dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store();
    Ok(ok(UserDashboard::load(store.as_ref(), &user.id).await))
}
