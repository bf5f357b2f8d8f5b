use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const COMPLETE_PERCENTAGE: u8 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl LessonStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LessonStatus::NotStarted => "not_started",
            LessonStatus::InProgress => "in_progress",
            LessonStatus::Completed => "completed",
        }
    }
}

/// Per (user, lesson) progress row.
///
/// `status == Completed`, `progress_percentage == 100` and `completed_at`
/// being set always hold together. Completed is terminal until `reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub user_id: String,
    pub lesson_id: String,
    #[serde(default)]
    pub status: LessonStatus,
    #[serde(default)]
    pub progress_percentage: u8,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl LessonProgress {
    pub fn new(user_id: impl Into<String>, lesson_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            lesson_id: lesson_id.into(),
            status: LessonStatus::NotStarted,
            progress_percentage: 0,
            started_at: None,
            completed_at: None,
            last_accessed: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == LessonStatus::Completed
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.status == LessonStatus::NotStarted {
            self.status = LessonStatus::InProgress;
            self.started_at = Some(now);
        }
        self.last_accessed = Some(now);
    }

    /// Applies a progress tick. Values above 100 are clamped; reaching 100
    /// completes the lesson. Ticks on a completed lesson only refresh
    /// `last_accessed`.
    pub fn update_progress(&mut self, percentage: u8, now: DateTime<Utc>) {
        self.last_accessed = Some(now);
        if self.is_completed() {
            return;
        }

        let percentage = percentage.min(COMPLETE_PERCENTAGE);
        self.progress_percentage = percentage;
        self.started_at.get_or_insert(now);

        if percentage == COMPLETE_PERCENTAGE {
            self.status = LessonStatus::Completed;
            self.completed_at = Some(now);
        } else {
            self.status = LessonStatus::InProgress;
        }
    }

    pub fn reset(&mut self) {
        self.status = LessonStatus::NotStarted;
        self.progress_percentage = 0;
        self.started_at = None;
        self.completed_at = None;
    }

    pub fn is_consistent(&self) -> bool {
        let completed = self.status == LessonStatus::Completed;
        let full = self.progress_percentage == COMPLETE_PERCENTAGE;
        let stamped = self.completed_at.is_some();
        completed == full && full == stamped && self.progress_percentage <= COMPLETE_PERCENTAGE
    }
}
