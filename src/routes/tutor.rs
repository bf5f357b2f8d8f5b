use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::AuthUser;
use crate::middleware::auth::require_tutor_access;
use crate::response::{ok, AppError};
use crate::services::tutor::{AskRequest, HintRequest, QuizRequest, TUTOR_UNAVAILABLE_MESSAGE};
use crate::state::AppState;

const STREAM_EVENT_BUFFER: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/messages", post(ask))
        .route("/sessions/:id/messages/stream", post(ask_stream))
        .route("/sessions/:id/hints", post(request_hint))
        .route("/sessions/:id/end", post(end_session))
        .route("/quiz", post(generate_quiz))
        .route_layer(middleware::from_fn(require_tutor_access))
}

async fn start_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.tutor().start_session(&user.id)))
}

async fn get_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.tutor().session(&user.id, &session_id)?))
}

async fn ask(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Json(body): Json<AskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reply = state.tutor().ask(&user.id, &session_id, body).await?;
    Ok(ok(reply))
}

#[derive(Serialize)]
struct StreamError<'a> {
    message: &'a str,
}

fn json_event<T: Serialize>(name: &'static str, payload: &T) -> Event {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(name).data(data)
}

/// SSE data may not carry `\r`; CRLF and bare CR become `\n`, which the
/// encoder splits into `data:` lines.
fn token_event(token: &str) -> Event {
    let data = token.replace("\r\n", "\n").replace('\r', "\n");
    Event::default().event("token").data(data)
}

/// Emits `meta` once, then `token` events, then exactly one of `done` or
/// `error`.
async fn ask_stream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Json(body): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (meta, tokens) = state.tutor().ask_stream(&user.id, &session_id, body).await?;

    let (tx, rx) = mpsc::channel::<Event>(STREAM_EVENT_BUFFER);
    tokio::spawn(async move {
        if tx.send(json_event("meta", &meta)).await.is_err() {
            return;
        }

        let mut tokens = match tokens {
            Ok(tokens) => tokens,
            Err(_) => {
                let _ = tx
                    .send(json_event("error", &StreamError { message: TUTOR_UNAVAILABLE_MESSAGE }))
                    .await;
                return;
            }
        };

        while let Some(chunk) = tokens.next().await {
            let event = match chunk {
                Ok(token) => token_event(&token),
                Err(e) => {
                    tracing::warn!(error = %e, session_id = %meta.session_id, "tutor stream interrupted");
                    let _ = tx
                        .send(json_event("error", &StreamError { message: TUTOR_UNAVAILABLE_MESSAGE }))
                        .await;
                    return;
                }
            };
            if tx.send(event).await.is_err() {
                return;
            }
        }

        let _ = tx.send(Event::default().event("done").data("[DONE]")).await;
    });

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn request_hint(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
    body: Option<Json<HintRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let reply = state.tutor().request_hint(&user.id, &session_id, request).await?;
    Ok(ok(reply))
}

async fn end_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(state.tutor().end_session(&user.id, &session_id)?))
}

async fn generate_quiz(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<QuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = state.tutor().generate_quiz(&user.id, body).await?;
    Ok(ok(quiz))
}
