use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_RANGE};
use serde_json::Value;

use super::{DataStore, Filter, Query, Row, StoreError};

const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// PostgREST-style client for the hosted backend's `/rest/v1` surface.
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.api_key.as_deref() {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert("apikey", value);
            }
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }
        headers
    }

    async fn rows_from(resp: reqwest::Response) -> Result<Vec<Row>, StoreError> {
        let resp = ensure_success(resp).await?;
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    _ => Err(StoreError::NotAnObject),
                })
                .collect(),
            Value::Object(map) => Ok(vec![map]),
            _ => Err(StoreError::NotAnObject),
        }
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::HttpStatus { status, body })
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(col, v) => (col.clone(), format!("eq.{}", literal(v))),
        Filter::Gte(col, v) => (col.clone(), format!("gte.{}", literal(v))),
        Filter::Lte(col, v) => (col.clone(), format!("lte.{}", literal(v))),
        Filter::In(col, values) => {
            let items: Vec<String> = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                    other => literal(other),
                })
                .collect();
            (col.clone(), format!("in.({})", items.join(",")))
        }
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(filter_param).collect()
}

/// Builds the PostgREST query string for a select.
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = Vec::new();

    let mut select = String::from("*");
    for embed in &query.embeds {
        select.push_str(&format!(",{}(*)", embed.relation));
    }
    params.push(("select".to_string(), select));
    params.extend(filter_params(&query.filters));

    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.descending { "desc" } else { "asc" }))
            .collect();
        params.push(("order".to_string(), order.join(",")));
    }

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// Parses the total out of a `Content-Range` header such as `0-24/3573` or `*/0`.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl DataStore for RestStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let resp = self
            .client
            .get(self.table_url(table))
            .headers(self.headers())
            .query(&query_params(query))
            .send()
            .await?;
        Self::rows_from(resp).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let resp = self
            .client
            .post(self.table_url(table))
            .headers(self.headers())
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        Self::rows_from(resp)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotAnObject)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        let resp = self
            .client
            .patch(self.table_url(table))
            .headers(self.headers())
            .header("Prefer", "return=representation")
            .query(&filter_params(filters))
            .json(&patch)
            .send()
            .await?;
        Self::rows_from(resp).await
    }

    async fn upsert(&self, table: &str, row: Row, conflict_key: &[&str]) -> Result<Row, StoreError> {
        let resp = self
            .client
            .post(self.table_url(table))
            .headers(self.headers())
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .query(&[("on_conflict", conflict_key.join(","))])
            .json(&row)
            .send()
            .await?;
        Self::rows_from(resp)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotAnObject)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let resp = self
            .client
            .delete(self.table_url(table))
            .headers(self.headers())
            .query(&filter_params(filters))
            .send()
            .await?;
        ensure_success(resp).await.map(|_| ())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let mut params = filter_params(filters);
        params.push(("select".to_string(), "*".to_string()));
        let resp = self
            .client
            .head(self.table_url(table))
            .headers(self.headers())
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        resp.headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| StoreError::Unavailable("missing Content-Range header".to_string()))
    }
}
