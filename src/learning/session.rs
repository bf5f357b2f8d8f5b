use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::difficulty::{clamp_difficulty, MIN_DIFFICULTY};

const HINT_MASTERY_PENALTY: f64 = 0.5;

/// One tutoring conversation. Owned by the user that opened it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSession {
    session_id: String,
    user_id: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
    concepts_discussed: Vec<String>,
    questions_asked: u32,
    hints_requested: u32,
    #[serde(skip)]
    hints_at_last_question: u32,
    difficulty_progression: Vec<u8>,
}

impl LearningSession {
    pub fn start(user_id: impl Into<String>, initial_difficulty: u8) -> Self {
        Self::start_at(user_id, initial_difficulty, Utc::now())
    }

    pub fn start_at(user_id: impl Into<String>, initial_difficulty: u8, now: DateTime<Utc>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            start_time: now,
            end_time: None,
            last_activity: now,
            concepts_discussed: Vec::new(),
            questions_asked: 0,
            hints_requested: 0,
            hints_at_last_question: 0,
            difficulty_progression: vec![clamp_difficulty(initial_difficulty as i64)],
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn concepts_discussed(&self) -> &[String] {
        &self.concepts_discussed
    }

    pub fn questions_asked(&self) -> u32 {
        self.questions_asked
    }

    pub fn hints_requested(&self) -> u32 {
        self.hints_requested
    }

    /// Hints requested since the previous question was asked.
    pub fn hints_since_last_question(&self) -> u32 {
        self.hints_requested.saturating_sub(self.hints_at_last_question)
    }

    pub fn difficulty_progression(&self) -> &[u8] {
        &self.difficulty_progression
    }

    pub fn initial_difficulty(&self) -> u8 {
        self.difficulty_progression
            .first()
            .copied()
            .unwrap_or(MIN_DIFFICULTY)
    }

    pub fn current_difficulty(&self) -> u8 {
        // progression is seeded on start and only ever appended to
        self.difficulty_progression
            .last()
            .copied()
            .unwrap_or(MIN_DIFFICULTY)
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn record_question(&mut self) {
        self.questions_asked = self.questions_asked.saturating_add(1);
        self.hints_at_last_question = self.hints_requested;
        self.last_activity = Utc::now();
    }

    pub fn record_hint(&mut self) {
        self.hints_requested = self.hints_requested.saturating_add(1);
        self.last_activity = Utc::now();
    }

    pub fn append_difficulty(&mut self, difficulty: u8) {
        self.difficulty_progression.push(clamp_difficulty(difficulty as i64));
    }

    pub fn add_concept(&mut self, concept: impl Into<String>) {
        let concept = concept.into();
        let trimmed = concept.trim();
        if !trimmed.is_empty() {
            self.concepts_discussed.push(trimmed.to_string());
        }
    }

    pub fn end(&mut self) {
        self.end_at(Utc::now());
    }

    /// Sets the end time once; later calls keep the first value. A clock that
    /// went backwards is pinned to the start time.
    pub fn end_at(&mut self, now: DateTime<Utc>) {
        if self.end_time.is_none() {
            self.end_time = Some(now.max(self.start_time));
        }
    }

    pub fn duration_seconds(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_seconds().max(0)
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_activity
    }

    /// Rough 0..=1 mastery estimate from where the difficulty ended up and how
    /// much the learner leaned on hints. A placeholder heuristic, not an
    /// assessment.
    pub fn estimated_mastery(&self) -> f64 {
        let level = self.current_difficulty() as f64 / 10.0;
        let hint_ratio = if self.questions_asked == 0 {
            if self.hints_requested > 0 { 1.0 } else { 0.0 }
        } else {
            (self.hints_requested as f64 / self.questions_asked as f64).min(1.0)
        };
        (level * (1.0 - HINT_MASTERY_PENALTY * hint_ratio)).clamp(0.0, 1.0)
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&mut self, at: DateTime<Utc>) {
        self.last_activity = at;
    }
}

/// Live tutoring sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, LearningSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: LearningSession) {
        self.sessions
            .write()
            .insert(session.session_id().to_string(), session);
    }

    pub fn snapshot(&self, user_id: &str, session_id: &str) -> Option<LearningSession> {
        self.sessions
            .read()
            .get(session_id)
            .filter(|s| s.user_id() == user_id)
            .cloned()
    }

    /// Runs `f` against the caller's own session. Sessions of other users are
    /// invisible.
    pub fn with_session<R>(
        &self,
        user_id: &str,
        session_id: &str,
        f: impl FnOnce(&mut LearningSession) -> R,
    ) -> Option<R> {
        let mut guard = self.sessions.write();
        let session = guard.get_mut(session_id)?;
        if session.user_id() != user_id {
            return None;
        }
        Some(f(session))
    }

    pub fn take(&self, user_id: &str, session_id: &str) -> Option<LearningSession> {
        let mut guard = self.sessions.write();
        if guard.get(session_id)?.user_id() != user_id {
            return None;
        }
        guard.remove(session_id)
    }

    pub fn take_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> Vec<LearningSession> {
        let mut guard = self.sessions.write();
        let idle_ids: Vec<String> = guard
            .values()
            .filter(|s| s.idle_for(now) > max_idle)
            .map(|s| s.session_id().to_string())
            .collect();

        idle_ids
            .iter()
            .filter_map(|id| guard.remove(id))
            .collect()
    }

    pub fn drain(&self) -> Vec<LearningSession> {
        self.sessions.write().drain().map(|(_, session)| session).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
