pub mod complexity;
pub mod difficulty;
pub mod experience;
pub mod progress;
pub mod session;
pub mod unlock;

pub use complexity::classify;
pub use difficulty::{
    adjust_difficulty, adjust_difficulty_with, clamp_difficulty, Adjustment, DifficultyThresholds,
    MAX_DIFFICULTY, MIN_DIFFICULTY, UNMEASURED_ACCURACY,
};
pub use experience::{ExperienceType, LearningExperience};
pub use progress::{LessonProgress, LessonStatus};
pub use session::{LearningSession, SessionRegistry};
pub use unlock::{lesson_unlock_flags, lock_state, LockState};
