use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::difficulty::clamp_difficulty;
use super::session::LearningSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceType {
    ConceptReview,
    DifficultyAdjustment,
    HintUsage,
    QuizGeneration,
}

impl ExperienceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExperienceType::ConceptReview => "concept_review",
            ExperienceType::DifficultyAdjustment => "difficulty_adjustment",
            ExperienceType::HintUsage => "hint_usage",
            ExperienceType::QuizGeneration => "quiz_generation",
        }
    }
}

/// Append-only log row describing one tracked tutoring interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningExperience {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub experience_type: ExperienceType,
    pub difficulty_level: u8,
    #[serde(default)]
    pub hints_used: u32,
    #[serde(default)]
    pub attempts_count: u32,
    /// Heuristic 0..=1 estimate; there is no formal assessment behind it.
    #[serde(default)]
    pub mastery_level: f64,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LearningExperience {
    pub fn new(user_id: impl Into<String>, experience_type: ExperienceType, difficulty_level: u8) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
            experience_type,
            difficulty_level: clamp_difficulty(difficulty_level as i64),
            hints_used: 0,
            attempts_count: 0,
            mastery_level: 0.0,
            concepts: Vec::new(),
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Snapshot of a session at the moment something worth logging happened.
    pub fn from_session(session: &LearningSession, experience_type: ExperienceType) -> Self {
        Self {
            session_id: Some(session.session_id().to_string()),
            hints_used: session.hints_requested(),
            attempts_count: session.questions_asked(),
            mastery_level: session.estimated_mastery(),
            concepts: session.concepts_discussed().to_vec(),
            ..Self::new(session.user_id(), experience_type, session.current_difficulty())
        }
    }

    /// Summary written when a session closes.
    pub fn session_summary(session: &LearningSession) -> Self {
        let mut record = Self::from_session(session, ExperienceType::ConceptReview);
        record.metadata = serde_json::json!({
            "startTime": session.start_time(),
            "endTime": session.end_time(),
            "durationSeconds": session.duration_seconds(),
            "difficultyProgression": session.difficulty_progression(),
        });
        record
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
