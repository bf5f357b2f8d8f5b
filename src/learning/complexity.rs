//! Rule-based complexity score for a learner's free-text question.
//!
//! Deliberately crude: the first matching rule wins and keywords are plain
//! case-insensitive substring matches (so "show" counts as "how").

use super::difficulty::clamp_difficulty;

pub const LONG_QUESTION_CHARS: usize = 100;

const LONG_SCORE: i64 = 7;
const EXPLANATORY_SCORE: i64 = 6;
const QUESTION_MARK_SCORE: i64 = 5;
const DEFINITIONAL_SCORE: i64 = 4;
const BASELINE_SCORE: i64 = 3;

pub fn classify(text: &str) -> u8 {
    let lower = text.to_lowercase();

    let score = if text.chars().count() > LONG_QUESTION_CHARS {
        LONG_SCORE
    } else if lower.contains("why") || lower.contains("how") {
        EXPLANATORY_SCORE
    } else if lower.contains("what") {
        DEFINITIONAL_SCORE
    } else if lower.contains('?') {
        QUESTION_MARK_SCORE
    } else {
        BASELINE_SCORE
    };

    clamp_difficulty(score)
}
