use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use crate::db::operations::{list_lessons, list_user_experiences, list_user_progress, Lesson};
use crate::db::{select_as, tables, DataStore, Query, Row, StoreError};
use crate::learning::{ExperienceType, LearningExperience, LessonProgress, LessonStatus, MAX_DIFFICULTY};
use crate::services::alerts::{AlertCenter, AlertSeverity};

const ADMIN_EXPERIENCE_WINDOW: usize = 5000;
const USER_EXPERIENCE_WINDOW: usize = 200;
const RECENT_TRAJECTORY_LEN: usize = 20;
const TOP_LESSONS: usize = 5;
const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCount {
    pub date: String,
    pub count: u64,
    pub cumulative: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelCount {
    pub level: u8,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStat {
    pub lesson_id: String,
    pub title: String,
    pub completions: u64,
    pub learners: u64,
}

/// A figure the backend either tracks or doesn't yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Metric {
    Available { value: u64 },
    Pending,
}

/// Outcome of one fan-out fetch after failure has been absorbed.
#[derive(Debug)]
pub struct Settled<T> {
    pub source: &'static str,
    pub value: T,
    pub failed: bool,
}

/// Awaits a fetch and substitutes `T::default()` on error.
pub async fn settle<T, E, F>(source: &'static str, fetch: F) -> Settled<T>
where
    T: Default,
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match fetch.await {
        Ok(value) => Settled { source, value, failed: false },
        Err(e) => {
            tracing::warn!(error = %e, source, "dashboard source failed, using empty default");
            Settled { source, value: T::default(), failed: true }
        }
    }
}

fn degraded<T>(settled: &Settled<T>) -> Option<&'static str> {
    settled.failed.then_some(settled.source)
}

/// Buckets timestamps by ISO calendar day. Values that don't parse as a
/// timestamp or date are skipped.
pub fn count_by_day<I, S>(timestamps: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = BTreeMap::new();
    for ts in timestamps {
        if let Some(day) = iso_day(ts.as_ref()) {
            *counts.entry(day).or_insert(0) += 1;
        }
    }
    counts
}

fn iso_day(value: &str) -> Option<String> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive().format("%Y-%m-%d").to_string());
    }
    let prefix = value.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Counts per key, largest first; ties keep alphabetical order. Missing
/// keys count as "uncategorized".
pub fn count_by_category<I, S>(keys: I) -> Vec<CategoryCount>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for key in keys {
        let key = key
            .as_ref()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .unwrap_or(UNCATEGORIZED)
            .to_string();
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut out: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(key, count)| CategoryCount { key, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

/// Running total: entry `i` is the sum of `counts[0..=i]`.
pub fn cumulative(counts: &[u64]) -> Vec<u64> {
    counts
        .iter()
        .scan(0u64, |total, c| {
            *total = total.saturating_add(*c);
            Some(*total)
        })
        .collect()
}

/// Stable descending sort by `metric`, truncated to `n`.
pub fn top_n<T>(mut items: Vec<T>, n: usize, metric: impl Fn(&T) -> f64) -> Vec<T> {
    items.sort_by(|a, b| {
        metric(b)
            .partial_cmp(&metric(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    items.truncate(n);
    items
}

fn daily_series(by_day: BTreeMap<String, u64>) -> Vec<DayCount> {
    let counts: Vec<u64> = by_day.values().copied().collect();
    by_day
        .into_iter()
        .zip(cumulative(&counts))
        .map(|((date, count), cumulative)| DayCount { date, count, cumulative })
        .collect()
}

fn difficulty_distribution<I: IntoIterator<Item = u8>>(levels: I) -> Vec<LevelCount> {
    let mut buckets = [0u64; MAX_DIFFICULTY as usize];
    for level in levels {
        if (1..=MAX_DIFFICULTY).contains(&level) {
            buckets[level as usize - 1] += 1;
        }
    }
    buckets
        .iter()
        .enumerate()
        .map(|(i, count)| LevelCount { level: i as u8 + 1, count: *count })
        .collect()
}

fn row_str<'a>(row: &'a Row, field: &str) -> Option<&'a str> {
    row.get(field).and_then(Value::as_str)
}

fn row_level(row: &Row) -> Option<u8> {
    row.get("difficulty_level")
        .and_then(Value::as_u64)
        .and_then(|v| u8::try_from(v).ok())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub total_users: u64,
    pub total_lessons: u64,
    pub total_experiences: u64,
    pub user_growth: Vec<DayCount>,
    pub experiences_by_type: Vec<CategoryCount>,
    pub lessons_by_category: Vec<CategoryCount>,
    pub top_lessons: Vec<LessonStat>,
    pub difficulty_distribution: Vec<LevelCount>,
    pub completion_rate: f64,
    pub lesson_views: Metric,
    pub degraded_sources: Vec<&'static str>,
}

impl AdminDashboard {
    /// Fans out the reads in parallel. A failed read contributes an
    /// empty input and is listed in `degraded_sources`; the call itself
    /// never fails.
    pub async fn load(store: &dyn DataStore, alerts: &AlertCenter) -> Self {
        let profiles_query = Query::new().order_by("created_at", false);
        let experiences_query = Query::new()
            .order_by("created_at", true)
            .limit(ADMIN_EXPERIENCE_WINDOW);

        let dashboard = Self::from_sources(
            store.select(tables::PROFILES, &profiles_query),
            list_lessons(store),
            select_as::<LessonProgress>(store, tables::LESSON_PROGRESS, &Query::new()),
            store.select(tables::LEARNING_EXPERIENCES, &experiences_query),
            store.count(tables::LEARNING_EXPERIENCES, &[]),
        )
        .await;

        if !dashboard.degraded_sources.is_empty() {
            alerts.raise(
                "dashboard",
                AlertSeverity::Warning,
                format!("Dashboard sources unavailable: {}", dashboard.degraded_sources.join(", ")),
            );
        }
        dashboard
    }

    /// `experiences` is a recent window used for breakdowns; the headline
    /// total comes from `experience_count`.
    pub async fn from_sources<P, L, G, X, C>(
        profiles: P,
        lessons: L,
        progress: G,
        experiences: X,
        experience_count: C,
    ) -> Self
    where
        P: Future<Output = Result<Vec<Row>, StoreError>>,
        L: Future<Output = Result<Vec<Lesson>, StoreError>>,
        G: Future<Output = Result<Vec<LessonProgress>, StoreError>>,
        X: Future<Output = Result<Vec<Row>, StoreError>>,
        C: Future<Output = Result<u64, StoreError>>,
    {
        let (profiles, lessons, progress, experiences, experience_count) = futures::join!(
            settle("profiles", profiles),
            settle("lessons", lessons),
            settle("lesson_progress", progress),
            settle("learning_experiences", experiences),
            settle("learning_experiences_count", experience_count),
        );

        let degraded_sources: Vec<&'static str> = [
            degraded(&profiles),
            degraded(&lessons),
            degraded(&progress),
            degraded(&experiences),
            degraded(&experience_count),
        ]
        .into_iter()
        .flatten()
        .collect();

        let user_growth = daily_series(count_by_day(
            profiles.value.iter().filter_map(|r| row_str(r, "created_at")),
        ));

        let experiences_by_type = count_by_category(
            experiences.value.iter().map(|r| row_str(r, "experience_type")),
        );

        let lessons_by_category =
            count_by_category(lessons.value.iter().map(|l| l.category.as_deref()));

        let top_lessons = top_lessons(&lessons.value, &progress.value);

        let difficulty_distribution =
            difficulty_distribution(experiences.value.iter().filter_map(row_level));

        let completed = progress.value.iter().filter(|p| p.is_completed()).count();
        let completion_rate = if progress.value.is_empty() {
            0.0
        } else {
            round1(completed as f64 / progress.value.len() as f64 * 100.0)
        };

        let windowed = experiences.value.len() as u64;
        let total_experiences = if experience_count.failed {
            windowed
        } else {
            experience_count.value.max(windowed)
        };

        Self {
            total_users: profiles.value.len() as u64,
            total_lessons: lessons.value.len() as u64,
            total_experiences,
            user_growth,
            experiences_by_type,
            lessons_by_category,
            top_lessons,
            difficulty_distribution,
            completion_rate,
            lesson_views: Metric::Pending,
            degraded_sources,
        }
    }
}

fn top_lessons(lessons: &[Lesson], progress: &[LessonProgress]) -> Vec<LessonStat> {
    let mut per_lesson: HashMap<&str, (u64, u64)> = HashMap::new();
    for p in progress {
        let entry = per_lesson.entry(p.lesson_id.as_str()).or_default();
        entry.1 += 1;
        if p.is_completed() {
            entry.0 += 1;
        }
    }

    let stats = lessons
        .iter()
        .map(|lesson| {
            let (completions, learners) = per_lesson.get(lesson.id.as_str()).copied().unwrap_or_default();
            LessonStat {
                lesson_id: lesson.id.clone(),
                title: lesson.title.clone(),
                completions,
                learners,
            }
        })
        .collect();

    top_n(stats, TOP_LESSONS, |s| s.completions as f64)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDashboard {
    pub lessons_completed: u64,
    pub lessons_in_progress: u64,
    pub average_progress: f64,
    pub sessions_completed: u64,
    pub hints_used: u64,
    pub average_mastery: f64,
    pub current_difficulty: Option<u8>,
    pub recent_difficulty: Vec<u8>,
    pub degraded_sources: Vec<&'static str>,
}

impl UserDashboard {
    pub async fn load(store: &dyn DataStore, user_id: &str) -> Self {
        let (progress, experiences) = futures::join!(
            settle("lesson_progress", list_user_progress(store, user_id)),
            settle(
                "learning_experiences",
                list_user_experiences(store, user_id, USER_EXPERIENCE_WINDOW)
            ),
        );

        let degraded_sources = [degraded(&progress), degraded(&experiences)]
            .into_iter()
            .flatten()
            .collect();

        Self::summarise(&progress.value, &experiences.value, degraded_sources)
    }

    /// `experiences` is newest first.
    fn summarise(
        progress: &[LessonProgress],
        experiences: &[LearningExperience],
        degraded_sources: Vec<&'static str>,
    ) -> Self {
        let lessons_completed = progress.iter().filter(|p| p.is_completed()).count() as u64;
        let lessons_in_progress = progress
            .iter()
            .filter(|p| p.status == LessonStatus::InProgress)
            .count() as u64;
        let average_progress = if progress.is_empty() {
            0.0
        } else {
            let total: u64 = progress.iter().map(|p| p.progress_percentage as u64).sum();
            round1(total as f64 / progress.len() as f64)
        };

        let summaries: Vec<&LearningExperience> = experiences
            .iter()
            .filter(|e| e.experience_type == ExperienceType::ConceptReview)
            .collect();
        let hints_used = summaries.iter().map(|e| e.hints_used as u64).sum();
        let average_mastery = if summaries.is_empty() {
            0.0
        } else {
            let total: f64 = summaries.iter().map(|e| e.mastery_level).sum();
            (total / summaries.len() as f64 * 100.0).round() / 100.0
        };

        let mut recent_difficulty: Vec<u8> = experiences
            .iter()
            .take(RECENT_TRAJECTORY_LEN)
            .map(|e| e.difficulty_level)
            .collect();
        recent_difficulty.reverse();

        Self {
            lessons_completed,
            lessons_in_progress,
            average_progress,
            sessions_completed: summaries.len() as u64,
            hints_used,
            average_mastery,
            current_difficulty: experiences.first().map(|e| e.difficulty_level),
            recent_difficulty,
            degraded_sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_count_by_day_buckets_and_skips_garbage() {
        let counts = count_by_day([
            "2024-03-01T10:00:00Z",
            "2024-03-01T23:59:59+00:00",
            "2024-03-02",
            "not a date",
        ]);
        assert_eq!(counts.get("2024-03-01"), Some(&2));
        assert_eq!(counts.get("2024-03-02"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_count_by_category_sorted_desc() {
        let counts = count_by_category([Some("math"), Some("art"), Some("math"), None, Some(" ")]);
        assert_eq!(counts[0], CategoryCount { key: "math".into(), count: 2 });
        assert_eq!(counts[1], CategoryCount { key: UNCATEGORIZED.into(), count: 2 });
        assert_eq!(counts[2], CategoryCount { key: "art".into(), count: 1 });
    }

    #[test]
    fn test_cumulative() {
        assert_eq!(cumulative(&[1, 0, 3, 2]), vec![1, 1, 4, 6]);
        assert!(cumulative(&[]).is_empty());
    }

    #[test]
    fn test_top_n_is_stable() {
        let items = vec![("a", 1.0), ("b", 3.0), ("c", 1.0), ("d", 3.0)];
        let top = top_n(items, 3, |(_, v)| *v);
        assert_eq!(top, vec![("b", 3.0), ("d", 3.0), ("a", 1.0)]);
    }

    #[test]
    fn test_difficulty_distribution_ignores_out_of_range() {
        let dist = difficulty_distribution([1, 1, 10, 0, 11]);
        assert_eq!(dist.len(), 10);
        assert_eq!(dist[0].count, 2);
        assert_eq!(dist[9].count, 1);
    }

    #[tokio::test]
    async fn test_settle_substitutes_default() {
        let failed = settle("x", async { Err::<Vec<u8>, _>("boom") }).await;
        assert!(failed.failed);
        assert!(failed.value.is_empty());

        let ok = settle("y", async { Ok::<_, String>(vec![1u8]) }).await;
        assert!(!ok.failed);
        assert_eq!(ok.value, vec![1]);
    }

    #[test]
    fn test_user_summary() {
        let now = Utc::now();
        let mut done = LessonProgress::new("u1", "l1");
        done.update_progress(100, now);
        let mut half = LessonProgress::new("u1", "l2");
        half.update_progress(50, now);

        let mut summary = LearningExperience::new("u1", ExperienceType::ConceptReview, 6);
        summary.hints_used = 2;
        summary.mastery_level = 0.5;
        let hint = LearningExperience::new("u1", ExperienceType::HintUsage, 4);

        let dashboard = UserDashboard::summarise(&[done, half], &[summary, hint], Vec::new());
        assert_eq!(dashboard.lessons_completed, 1);
        assert_eq!(dashboard.lessons_in_progress, 1);
        assert_eq!(dashboard.average_progress, 75.0);
        assert_eq!(dashboard.sessions_completed, 1);
        assert_eq!(dashboard.hints_used, 2);
        assert_eq!(dashboard.current_difficulty, Some(6));
        assert_eq!(dashboard.recent_difficulty, vec![4, 6]);
    }

    #[test]
    fn test_pending_metric_shape() {
        assert_eq!(serde_json::to_value(Metric::Pending).unwrap(), serde_json::json!({ "status": "pending" }));
    }
}
