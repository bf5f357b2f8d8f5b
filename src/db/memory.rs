use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use super::{compare_values, DataStore, Filter, Query, Row, StoreError};

/// In-process store with the same semantics as the REST backend. Used when no
/// BaaS is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds rows as-is, without defaulting `id` or `created_at`.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    fn embed_relations(&self, rows: &mut [Row], query: &Query) {
        if query.embeds.is_empty() {
            return;
        }
        let tables = self.tables.read();
        for embed in &query.embeds {
            let related = tables.get(&embed.relation);
            for row in rows.iter_mut() {
                let target = row.get(&embed.foreign_key).cloned();
                let found = match (related, target) {
                    (Some(related), Some(key)) => related
                        .iter()
                        .find(|r| r.get("id") == Some(&key))
                        .cloned()
                        .map(Value::Object)
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                row.insert(embed.relation.clone(), found);
            }
        }
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn with_defaults(mut row: Row) -> Row {
    row.entry("id")
        .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
    row.entry("created_at")
        .or_insert_with(|| Value::String(now_iso()));
    row
}

fn all_match(filters: &[Filter], row: &Row) -> bool {
    filters.iter().all(|f| f.matches(row))
}

fn order_rows(rows: &mut [Row], query: &Query) {
    if query.order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for order in &query.order {
            let left = a.get(&order.column).unwrap_or(&Value::Null);
            let right = b.get(&order.column).unwrap_or(&Value::Null);
            let ord = compare_values(left, right).unwrap_or(Ordering::Equal);
            let ord = if order.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
        let mut rows: Vec<Row> = {
            let tables = self.tables.read();
            tables
                .get(table)
                .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
                .unwrap_or_default()
        };

        order_rows(&mut rows, query);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        self.embed_relations(&mut rows, query);
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let row = with_defaults(row);
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|r| all_match(filters, r)) {
            for (key, value) in &patch {
                row.insert(key.clone(), value.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn upsert(&self, table: &str, row: Row, conflict_key: &[&str]) -> Result<Row, StoreError> {
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();

        let existing = rows.iter_mut().find(|candidate| {
            !conflict_key.is_empty()
                && conflict_key
                    .iter()
                    .all(|key| row.get(*key).is_some() && candidate.get(*key) == row.get(*key))
        });

        match existing {
            Some(existing) => {
                for (key, value) in row {
                    existing.insert(key, value);
                }
                Ok(existing.clone())
            }
            None => {
                let row = with_defaults(row);
                rows.push(row.clone());
                Ok(row)
            }
        }
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        if let Some(rows) = self.tables.write().get_mut(table) {
            rows.retain(|r| !all_match(filters, r));
        }
        Ok(())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let tables = self.tables.read();
        let count = tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| all_match(filters, r)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_created_at() {
        let store = MemoryStore::new();
        let inserted = store.insert("t", row(json!({ "name": "a" }))).await.unwrap();
        assert!(inserted.get("id").and_then(Value::as_str).is_some());
        assert!(inserted.get("created_at").is_some());
    }

    #[tokio::test]
    async fn test_select_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (name, score) in [("a", 3), ("b", 9), ("c", 5), ("d", 1)] {
            store.insert("t", row(json!({ "name": name, "score": score }))).await.unwrap();
        }

        let query = Query::new().gte("score", 3).order_by("score", true).limit(2);
        let rows = store.select("t", &query).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_upsert_merges_on_conflict_key() {
        let store = MemoryStore::new();
        store
            .upsert("p", row(json!({ "user_id": "u", "lesson_id": "l", "pct": 10 })), &["user_id", "lesson_id"])
            .await
            .unwrap();
        store
            .upsert("p", row(json!({ "user_id": "u", "lesson_id": "l", "pct": 60 })), &["user_id", "lesson_id"])
            .await
            .unwrap();
        store
            .upsert("p", row(json!({ "user_id": "u", "lesson_id": "m", "pct": 5 })), &["user_id", "lesson_id"])
            .await
            .unwrap();

        assert_eq!(store.count("p", &[]).await.unwrap(), 2);
        let rows = store.select("p", &Query::new().eq("lesson_id", "l")).await.unwrap();
        assert_eq!(rows[0]["pct"], json!(60));
    }

    #[tokio::test]
    async fn test_update_delete_count() {
        let store = MemoryStore::new();
        store.insert("t", row(json!({ "k": 1 }))).await.unwrap();
        store.insert("t", row(json!({ "k": 2 }))).await.unwrap();

        let filters = [Filter::Eq("k".into(), json!(2))];
        let updated = store.update("t", &filters, row(json!({ "flag": true }))).await.unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["flag"], json!(true));

        store.delete("t", &filters).await.unwrap();
        assert_eq!(store.count("t", &[]).await.unwrap(), 1);
        assert_eq!(store.count("missing", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_embed_related_row() {
        let store = MemoryStore::new();
        store.seed("lessons", [row(json!({ "id": "l1", "title": "Cells" }))]);
        store.insert("progress", row(json!({ "lesson_id": "l1" }))).await.unwrap();
        store.insert("progress", row(json!({ "lesson_id": "gone" }))).await.unwrap();

        let rows = store
            .select("progress", &Query::new().embed("lessons", "lesson_id").order_by("lesson_id", false))
            .await
            .unwrap();
        assert_eq!(rows[0]["lessons"], Value::Null);
        assert_eq!(rows[1]["lessons"]["title"], json!("Cells"));
    }
}
