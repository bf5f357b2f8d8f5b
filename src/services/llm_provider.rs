use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::cache::keys::completion_key;
use crate::cache::TtlCache;
use crate::config::env_string;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;
const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
    #[error("stream interrupted: {0}")]
    Stream(String),
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// Black-box text completion: messages in, text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String, LLMError>;

    /// Token-by-token variant. The default yields the whole completion as a
    /// single chunk.
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<TokenStream, LLMError> {
        let text = self.complete(messages, options).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok::<_, LLMError>(text) })))
    }
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct LLMProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

impl LLMProvider {
    pub fn new(config: LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Self {
        let api_key = env_string("LLM_API_KEY");
        let model = env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("LLM_API_ENDPOINT")
                .or_else(|| env_string("LLM_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout = Duration::from_millis(
            env_string("LLM_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        );

        Self::new(LLMConfig { api_key, model, api_endpoint, timeout })
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }

    fn api_key(&self) -> Result<&str, LLMError> {
        self.config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LLMError::NotConfigured("LLM_API_KEY"))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'))
    }

    fn payload(&self, messages: &[ChatMessage], options: &CompletionOptions, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        })
    }

    pub async fn chat(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<ChatResponse, LLMError> {
        let api_key = self.api_key()?;
        let payload = self.payload(messages, options, false);
        self.post_with_retry(&self.completions_url(), api_key, &payload).await
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, LLMError> {
        let mut last_error: Option<LLMError> = None;

        for retry in 0..=MAX_RETRIES {
            match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(|e| {
                            tracing::error!(error = %e, body = %String::from_utf8_lossy(&bytes), "failed to parse LLM response JSON");
                            LLMError::Json(e)
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = LLMError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        warn!(retry, ?status, "LLM request failed, retrying");
                        sleep(backoff(retry)).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = LLMError::Request(e);
                    if retry < MAX_RETRIES {
                        warn!(retry, "LLM request error, retrying");
                        sleep(backoff(retry)).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(LLMError::NotConfigured("unknown")))
    }
}

#[async_trait]
impl CompletionService for LLMProvider {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String, LLMError> {
        let response = self.chat(messages, options).await?;
        response
            .first_content()
            .map(|s| s.to_string())
            .ok_or(LLMError::EmptyChoices)
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<TokenStream, LLMError> {
        let api_key = self.api_key()?;
        let payload = self.payload(messages, options, true);

        let resp = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LLMError::HttpStatus { status, body });
        }

        let (tx, rx) = mpsc::channel::<Result<String, LLMError>>(STREAM_CHANNEL_CAPACITY);
        let mut body = resp.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(LLMError::Stream(e.to_string()))).await;
                        return;
                    }
                };
                for event in decoder.push(&chunk) {
                    match event {
                        SseEvent::Token(token) => {
                            if tx.send(Ok(token)).await.is_err() {
                                return;
                            }
                        }
                        SseEvent::Done => return,
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Token(String),
    Done,
}

/// Incremental decoder for `data: {...}` lines of a streamed completion.
/// Buffers bytes so that lines and UTF-8 sequences split across network
/// chunks are reassembled.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
                continue;
            }
            let content = serde_json::from_str::<serde_json::Value>(data)
                .ok()
                .and_then(|v| {
                    v.pointer("/choices/0/delta/content")
                        .and_then(|c| c.as_str())
                        .map(str::to_string)
                });
            if let Some(content) = content.filter(|c| !c.is_empty()) {
                events.push(SseEvent::Token(content));
            }
        }
        events
    }
}

/// Memoises non-streaming completions for a fixed TTL.
pub struct CachedCompletions {
    inner: Arc<dyn CompletionService>,
    cache: Arc<TtlCache<String, String>>,
    ttl: Duration,
}

impl CachedCompletions {
    pub fn new(inner: Arc<dyn CompletionService>, cache: Arc<TtlCache<String, String>>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl CompletionService for CachedCompletions {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<String, LLMError> {
        if self.ttl.is_zero() {
            return self.inner.complete(messages, options).await;
        }

        let key = completion_key(&(messages, options));
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(%key, "completion cache hit");
            return Ok(hit);
        }

        let text = self.inner.complete(messages, options).await?;
        self.cache.insert_with_ttl(key, text.clone(), self.ttl);
        Ok(text)
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<TokenStream, LLMError> {
        self.inner.complete_stream(messages, options).await
    }
}

fn backoff(retry: usize) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
