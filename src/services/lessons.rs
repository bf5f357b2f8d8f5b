use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::db::operations::{get_progress, list_lessons, list_user_progress, save_progress, Lesson};
use crate::db::{DataStore, StoreError};
use crate::learning::unlock::any_completed;
use crate::learning::{lesson_unlock_flags, lock_state, LessonProgress, LockState};
use crate::response::AppError;

#[derive(Debug, Error)]
pub enum LessonError {
    #[error("lesson not found")]
    NotFound,
    #[error("lesson is locked")]
    Locked,
    #[error("lesson has not been started")]
    NotStarted,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LessonError> for AppError {
    fn from(err: LessonError) -> Self {
        match err {
            LessonError::NotFound => AppError::not_found("Lesson not found"),
            LessonError::Locked => AppError::conflict(
                "LESSON_LOCKED",
                "Complete at least one lesson to unlock this one",
            ),
            LessonError::NotStarted => AppError::conflict("LESSON_NOT_STARTED", "Start the lesson first"),
            LessonError::Store(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub state: LockState,
    pub progress: Option<LessonProgress>,
}

/// Catalogue for one user with lock flags recomputed from their progress.
/// A failed progress read degrades to "no progress" rather than failing the
/// list.
pub async fn list_for_user(store: &dyn DataStore, user_id: &str) -> Result<Vec<LessonView>, LessonError> {
    let lessons = list_lessons(store).await?;
    let progress = list_user_progress(store, user_id).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, user_id, "progress read failed, treating as empty");
        Vec::new()
    });

    let flags = lesson_unlock_flags(lessons.len(), &progress);
    let views = lessons
        .into_iter()
        .zip(flags)
        .map(|(lesson, state)| {
            let own = progress.iter().find(|p| p.lesson_id == lesson.id).cloned();
            LessonView {
                state,
                progress: own,
                lesson,
            }
        })
        .collect();
    Ok(views)
}

/// Starts (or re-opens) a lesson. Locked lessons are rejected before any
/// write.
pub async fn start_lesson(
    store: &dyn DataStore,
    user_id: &str,
    lesson_id: &str,
) -> Result<LessonProgress, LessonError> {
    let lessons = list_lessons(store).await?;
    let position = lessons
        .iter()
        .position(|l| l.id == lesson_id)
        .ok_or(LessonError::NotFound)?;

    let progress = list_user_progress(store, user_id).await?;
    if !lock_state(position, any_completed(&progress)).is_unlocked() {
        tracing::info!(user_id, lesson_id, "rejected start of locked lesson");
        return Err(LessonError::Locked);
    }

    let mut record = progress
        .into_iter()
        .find(|p| p.lesson_id == lesson_id)
        .unwrap_or_else(|| LessonProgress::new(user_id, lesson_id));
    record.start(Utc::now());

    Ok(save_progress(store, &record).await?)
}

/// Records progress on a started lesson. The lock is re-checked, so a row
/// left behind on a lesson that has since re-locked can't be advanced.
pub async fn update_progress(
    store: &dyn DataStore,
    user_id: &str,
    lesson_id: &str,
    percentage: i64,
) -> Result<LessonProgress, LessonError> {
    let lessons = list_lessons(store).await?;
    let position = lessons
        .iter()
        .position(|l| l.id == lesson_id)
        .ok_or(LessonError::NotFound)?;

    let progress = list_user_progress(store, user_id).await?;
    if !lock_state(position, any_completed(&progress)).is_unlocked() {
        tracing::info!(user_id, lesson_id, "rejected progress on locked lesson");
        return Err(LessonError::Locked);
    }

    let mut record = progress
        .into_iter()
        .find(|p| p.lesson_id == lesson_id)
        .ok_or(LessonError::NotStarted)?;

    let was_completed = record.is_completed();
    record.update_progress(percentage.clamp(0, 100) as u8, Utc::now());
    if record.is_completed() && !was_completed {
        tracing::info!(user_id, lesson_id, "lesson completed");
    }

    Ok(save_progress(store, &record).await?)
}

/// Reverts a lesson to not started. Resetting a lesson with no progress row
/// writes nothing.
pub async fn reset_lesson(
    store: &dyn DataStore,
    user_id: &str,
    lesson_id: &str,
) -> Result<LessonProgress, LessonError> {
    match get_progress(store, user_id, lesson_id).await? {
        Some(mut record) => {
            record.reset();
            Ok(save_progress(store, &record).await?)
        }
        None => Ok(LessonProgress::new(user_id, lesson_id)),
    }
}
