use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::response::{ok, AppError};
use crate::services::lessons;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_lessons))
        .route("/:id/start", post(start_lesson))
        .route("/:id/progress", put(update_progress))
        .route("/:id/reset", post(reset_lesson))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProgressRequest {
    progress_percentage: i64,
}

async fn list_lessons(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store();
    let views = lessons::list_for_user(store.as_ref(), &user.id).await?;
    Ok(ok(views))
}

async fn start_lesson(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store();
    let progress = lessons::start_lesson(store.as_ref(), &user.id, &lesson_id).await?;
    Ok(ok(progress))
}

async fn update_progress(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(lesson_id): Path<String>,
    Json(body): Json<UpdateProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store();
    let progress =
        lessons::update_progress(store.as_ref(), &user.id, &lesson_id, body.progress_percentage).await?;
    Ok(ok(progress))
}

async fn reset_lesson(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let store = state.store();
    let progress = lessons::reset_lesson(store.as_ref(), &user.id, &lesson_id).await?;
    Ok(ok(progress))
}
