pub mod memory;
pub mod operations;
pub mod rest;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Config;

pub use memory::MemoryStore;
pub use rest::RestStore;

pub type Row = Map<String, Value>;

pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const LESSONS: &str = "lessons";
    pub const LESSON_PROGRESS: &str = "lesson_progress";
    pub const LEARNING_EXPERIENCES: &str = "learning_experiences";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("row must be a JSON object")]
    NotAnObject,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::Gte(c, _) | Filter::Lte(c, _) | Filter::In(c, _) => c,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(self.column()) else {
            return false;
        };
        match self {
            Filter::Eq(_, expected) => values_equal(actual, expected),
            Filter::Gte(_, bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lte(_, bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::In(_, set) => set.iter().any(|v| values_equal(actual, v)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Embedded join: each returned row gets the `relation` row whose `id`
/// equals the row's `foreign_key` column, stored under the relation name.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub relation: String,
    pub foreign_key: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub embeds: Vec<Embed>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(column.to_string(), value.into()));
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filters.push(Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn embed(mut self, relation: &str, foreign_key: &str) -> Self {
        self.embeds.push(Embed {
            relation: relation.to_string(),
            foreign_key: foreign_key.to_string(),
        });
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

/// Table-oriented data store. Eventually consistent; no cross-table
/// transactions.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError>;

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    /// Patches every row matching `filters`, returning the updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError>;

    /// Inserts or merges by the `conflict_key` columns.
    async fn upsert(&self, table: &str, row: Row, conflict_key: &[&str]) -> Result<Row, StoreError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        self.count(tables::PROFILES, &[]).await.map(|_| ())
    }
}

pub fn connect(config: &Config) -> Arc<dyn DataStore> {
    match config.baas_url.as_deref() {
        Some(url) => {
            tracing::info!(url, "using REST data store");
            Arc::new(RestStore::new(url, config.baas_api_key.clone()))
        }
        None => {
            tracing::warn!("BAAS_URL not set, using in-memory data store");
            Arc::new(MemoryStore::new())
        }
    }
}

pub async fn select_as<T>(store: &dyn DataStore, table: &str, query: &Query) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
{
    let rows = store.select(table, query).await?;
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(StoreError::from))
        .collect()
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::NotAnObject),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numbers compare numerically, strings lexically (RFC 3339 UTC timestamps
/// therefore compare chronologically). Mixed types are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filters() {
        let r = row(json!({ "id": "a", "score": 7, "created_at": "2024-03-02T10:00:00Z" }));

        assert!(Filter::Eq("score".into(), json!(7.0)).matches(&r));
        assert!(Filter::Gte("created_at".into(), json!("2024-03-01T00:00:00Z")).matches(&r));
        assert!(!Filter::Lte("created_at".into(), json!("2024-03-01T00:00:00Z")).matches(&r));
        assert!(Filter::In("id".into(), vec![json!("x"), json!("a")]).matches(&r));
        assert!(!Filter::Eq("missing".into(), json!(1)).matches(&r));
    }

    #[test]
    fn test_mixed_types_never_match_ranges() {
        let r = row(json!({ "score": "7" }));
        assert!(!Filter::Gte("score".into(), json!(1)).matches(&r));
    }
}
