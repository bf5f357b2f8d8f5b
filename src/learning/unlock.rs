use serde::{Deserialize, Serialize};

use super::progress::LessonProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Locked,
    Unlocked,
}

impl LockState {
    pub fn is_unlocked(self) -> bool {
        self == LockState::Unlocked
    }
}

pub fn any_completed<'a>(progress: impl IntoIterator<Item = &'a LessonProgress>) -> bool {
    progress.into_iter().any(LessonProgress::is_completed)
}

/// Unlocking is flat, not sequential: the first lesson is always open and a
/// single completed lesson anywhere opens every other one.
pub fn lock_state(position: usize, any_completed: bool) -> LockState {
    if position == 0 || any_completed {
        LockState::Unlocked
    } else {
        LockState::Locked
    }
}

pub fn lesson_unlock_flags(lesson_count: usize, progress: &[LessonProgress]) -> Vec<LockState> {
    let unlocked_all = any_completed(progress);
    (0..lesson_count)
        .map(|position| lock_state(position, unlocked_all))
        .collect()
}
