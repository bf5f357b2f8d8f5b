use serde::{Deserialize, Serialize};

use crate::db::{select_as, tables, DataStore, Query, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Lessons in catalogue order.
pub async fn list_lessons(store: &dyn DataStore) -> Result<Vec<Lesson>, StoreError> {
    let query = Query::new()
        .order_by("position", false)
        .order_by("created_at", false);
    select_as(store, tables::LESSONS, &query).await
}

