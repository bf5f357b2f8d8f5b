use serde_json::Value;

use crate::db::{select_as, tables, to_row, DataStore, Query, StoreError};
use crate::learning::{LearningExperience, LessonProgress};

const PROGRESS_CONFLICT_KEY: &[&str] = &["user_id", "lesson_id"];

pub async fn list_user_progress(
    store: &dyn DataStore,
    user_id: &str,
) -> Result<Vec<LessonProgress>, StoreError> {
    let query = Query::new().eq("user_id", user_id);
    select_as(store, tables::LESSON_PROGRESS, &query).await
}

pub async fn get_progress(
    store: &dyn DataStore,
    user_id: &str,
    lesson_id: &str,
) -> Result<Option<LessonProgress>, StoreError> {
    let query = Query::new()
        .eq("user_id", user_id)
        .eq("lesson_id", lesson_id)
        .limit(1);
    let mut rows: Vec<LessonProgress> = select_as(store, tables::LESSON_PROGRESS, &query).await?;
    Ok(rows.pop())
}

/// Upserts by (user_id, lesson_id); concurrent writers are resolved by the store.
pub async fn save_progress(
    store: &dyn DataStore,
    progress: &LessonProgress,
) -> Result<LessonProgress, StoreError> {
    let row = store
        .upsert(tables::LESSON_PROGRESS, to_row(progress)?, PROGRESS_CONFLICT_KEY)
        .await?;
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub async fn insert_experience(
    store: &dyn DataStore,
    experience: &LearningExperience,
) -> Result<(), StoreError> {
    store
        .insert(tables::LEARNING_EXPERIENCES, to_row(experience)?)
        .await
        .map(|_| ())
}

pub async fn list_user_experiences(
    store: &dyn DataStore,
    user_id: &str,
    limit: usize,
) -> Result<Vec<LearningExperience>, StoreError> {
    let query = Query::new()
        .eq("user_id", user_id)
        .order_by("created_at", true)
        .limit(limit);
    select_as(store, tables::LEARNING_EXPERIENCES, &query).await
}
