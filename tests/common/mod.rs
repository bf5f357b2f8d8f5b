#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;

use tutor_backend::auth::sign_token;
use tutor_backend::config::Config;
use tutor_backend::db::{tables, MemoryStore, Row};
use tutor_backend::services::llm_provider::{ChatMessage, CompletionOptions, CompletionService, LLMError};
use tutor_backend::state::AppState;

pub const SECRET: &str = "integration-secret";

/// Completion backend that always answers with the same text, or always
/// fails when `reply` is `None`.
pub struct ScriptedCompletions {
    reply: Option<String>,
}

#[async_trait]
impl CompletionService for ScriptedCompletions {
    async fn complete(&self, _messages: &[ChatMessage], _options: &CompletionOptions) -> Result<String, LLMError> {
        self.reply
            .clone()
            .ok_or(LLMError::NotConfigured("LLM_API_KEY"))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with_reply(Some("Here is an explanation."))
}

pub fn create_test_app_with_reply(reply: Option<&str>) -> TestApp {
    let config = Config {
        jwt_secret: Some(SECRET.to_string()),
        workers_enabled: false,
        ..Config::default()
    };
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(ScriptedCompletions {
        reply: reply.map(str::to_string),
    });
    let state = AppState::new(config, store.clone(), llm);
    let router = tutor_backend::create_app_with(state.clone());
    TestApp { router, store, state }
}

pub fn token_for(user_id: &str) -> String {
    sign_token(user_id, SECRET, chrono::Duration::hours(1)).unwrap()
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

pub fn seed_profile(store: &MemoryStore, id: &str, role: &str) {
    store.seed(
        tables::PROFILES,
        [row(serde_json::json!({
            "id": id,
            "email": format!("{id}@example.com"),
            "role": role,
            "created_at": "2024-05-01T09:00:00Z",
        }))],
    );
}

pub fn seed_lessons(store: &MemoryStore, count: usize) {
    let lessons: Vec<Row> = (0..count)
        .map(|i| {
            row(serde_json::json!({
                "id": format!("lesson-{i}"),
                "title": format!("Lesson {i}"),
                "category": if i % 2 == 0 { "science" } else { "math" },
                "position": i,
            }))
        })
        .collect();
    store.seed(tables::LESSONS, lessons);
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
