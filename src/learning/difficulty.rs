use serde::{Deserialize, Serialize};

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 10;

const DEFAULT_FAST_RESPONSE_SECS: f64 = 15.0;
const DEFAULT_SLOW_RESPONSE_SECS: f64 = 60.0;
const DEFAULT_HIGH_ACCURACY: f64 = 0.8;
const DEFAULT_LOW_ACCURACY: f64 = 0.5;

/// Accuracy passed to the engine when the client supplied no measurement.
/// It sits between the low and high thresholds, so on its own it never moves
/// the difficulty.
pub const UNMEASURED_ACCURACY: f64 = 0.65;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyThresholds {
    pub fast_response_secs: f64,
    pub slow_response_secs: f64,
    pub high_accuracy: f64,
    pub low_accuracy: f64,
}

impl Default for DifficultyThresholds {
    fn default() -> Self {
        Self {
            fast_response_secs: DEFAULT_FAST_RESPONSE_SECS,
            slow_response_secs: DEFAULT_SLOW_RESPONSE_SECS,
            high_accuracy: DEFAULT_HIGH_ACCURACY,
            low_accuracy: DEFAULT_LOW_ACCURACY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjustment {
    Increase,
    Decrease,
    Hold,
}

impl Adjustment {
    fn delta(self) -> i16 {
        match self {
            Adjustment::Increase => 1,
            Adjustment::Decrease => -1,
            Adjustment::Hold => 0,
        }
    }
}

pub fn clamp_difficulty(value: i64) -> u8 {
    value.clamp(MIN_DIFFICULTY as i64, MAX_DIFFICULTY as i64) as u8
}

/// Picks the direction of the next nudge. The increase and decrease branches
/// are mutually exclusive, so at most one step is ever taken per call.
pub fn decide(
    thresholds: &DifficultyThresholds,
    response_time_secs: f64,
    accuracy: f64,
    hints_used: u32,
) -> Adjustment {
    let fast = response_time_secs < thresholds.fast_response_secs;
    let slow = response_time_secs > thresholds.slow_response_secs;
    let high_accuracy = accuracy > thresholds.high_accuracy;
    let low_accuracy = accuracy < thresholds.low_accuracy;

    if fast && high_accuracy && hints_used == 0 {
        Adjustment::Increase
    } else if slow || low_accuracy || hints_used > 0 {
        Adjustment::Decrease
    } else {
        Adjustment::Hold
    }
}

pub fn adjust_difficulty_with(
    thresholds: &DifficultyThresholds,
    current: u8,
    response_time_secs: f64,
    accuracy: f64,
    hints_used: u32,
) -> u8 {
    let base = clamp_difficulty(current as i64) as i16;
    let step = decide(thresholds, response_time_secs, accuracy, hints_used).delta();
    clamp_difficulty((base + step) as i64)
}

/// Heuristic single-step nudge of a 1..=10 difficulty level. Not a learned
/// model: fast, accurate, unaided answers push it up; slow or inaccurate
/// answers, or any hint, pull it down.
pub fn adjust_difficulty(current: u8, response_time_secs: f64, accuracy: f64, hints_used: u32) -> u8 {
    adjust_difficulty_with(
        &DifficultyThresholds::default(),
        current,
        response_time_secs,
        accuracy,
        hints_used,
    )
}
