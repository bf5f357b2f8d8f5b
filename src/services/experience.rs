use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::db::operations::insert_experience;
use crate::db::DataStore;
use crate::learning::LearningExperience;
use crate::services::alerts::{AlertCenter, AlertSeverity};

const DEFAULT_BASE_BACKOFF: Duration = Duration::from_millis(200);
const ALERT_SOURCE: &str = "experience_recorder";

#[derive(Debug, Clone, Copy)]
pub struct RecorderOptions {
    pub capacity: usize,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            capacity: 1024,
            max_retries: 3,
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStats {
    pub queued: u64,
    pub written: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Fire-and-forget writer for learning experience rows.
///
/// `record` never blocks and never fails the caller. A background task owns
/// the store writes and retries them with exponential backoff; rows that
/// still fail are logged and surfaced as an admin alert.
pub struct ExperienceRecorder {
    sender: Mutex<Option<mpsc::Sender<LearningExperience>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl ExperienceRecorder {
    /// Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn DataStore>, alerts: Arc<AlertCenter>, options: RecorderOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker = tokio::spawn(run_writer(rx, store, alerts, options, counters.clone()));

        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            counters,
        }
    }

    pub fn record(&self, experience: LearningExperience) {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            warn!(
                experience_type = experience.experience_type.as_str(),
                "experience recorder is shut down, dropping record"
            );
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match sender.try_send(experience) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(experience)) => {
                warn!(
                    user_id = %experience.user_id,
                    experience_type = experience.experience_type.as_str(),
                    "experience queue full, dropping record"
                );
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(experience)) => {
                warn!(
                    user_id = %experience.user_id,
                    experience_type = experience.experience_type.as_str(),
                    "experience queue closed, dropping record"
                );
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Closes the queue and waits until every queued record has been handled.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "experience writer task panicked");
            }
        }
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<LearningExperience>,
    store: Arc<dyn DataStore>,
    alerts: Arc<AlertCenter>,
    options: RecorderOptions,
    counters: Arc<Counters>,
) {
    while let Some(experience) = rx.recv().await {
        match write_with_retry(store.as_ref(), &experience, &options).await {
            Ok(attempts) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
                debug!(
                    user_id = %experience.user_id,
                    experience_type = experience.experience_type.as_str(),
                    attempts,
                    "experience recorded"
                );
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    error = %e,
                    user_id = %experience.user_id,
                    experience_type = experience.experience_type.as_str(),
                    "experience write failed after retries"
                );
                alerts.raise(
                    ALERT_SOURCE,
                    AlertSeverity::Error,
                    format!("Learning experience writes are failing: {e}"),
                );
            }
        }
    }
    debug!("experience writer drained");
}

async fn write_with_retry(
    store: &dyn DataStore,
    experience: &LearningExperience,
    options: &RecorderOptions,
) -> Result<u32, crate::db::StoreError> {
    let mut attempt = 0u32;
    loop {
        match insert_experience(store, experience).await {
            Ok(()) => return Ok(attempt + 1),
            Err(e) if attempt < options.max_retries => {
                warn!(error = %e, attempt, "experience write failed, retrying");
                tokio::time::sleep(options.base_backoff * 2u32.saturating_pow(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;
    use crate::db::{tables, Filter, MemoryStore, Query, Row, StoreError};
    use crate::learning::ExperienceType;

    /// Fails the first `failures` inserts, then delegates to memory.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl DataStore for FlakyStore {
        async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, StoreError> {
            self.inner.select(table, query).await
        }

        async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("flaky".into()));
            }
            self.inner.insert(table, row).await
        }

        async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
            self.inner.update(table, filters, patch).await
        }

        async fn upsert(&self, table: &str, row: Row, conflict_key: &[&str]) -> Result<Row, StoreError> {
            self.inner.upsert(table, row, conflict_key).await
        }

        async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
            self.inner.delete(table, filters).await
        }

        async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
            self.inner.count(table, filters).await
        }
    }

    fn fast_options(max_retries: u32) -> RecorderOptions {
        RecorderOptions {
            capacity: 16,
            max_retries,
            base_backoff: Duration::from_millis(1),
        }
    }

    fn flaky(failures: u32) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(failures),
        })
    }

    #[tokio::test]
    async fn test_records_are_written_on_shutdown_drain() {
        let store = flaky(0);
        let alerts = Arc::new(AlertCenter::new());
        let recorder = ExperienceRecorder::spawn(store.clone(), alerts.clone(), fast_options(3));

        for _ in 0..5 {
            recorder.record(LearningExperience::new("u1", ExperienceType::HintUsage, 4));
        }
        recorder.shutdown().await;

        assert_eq!(store.inner.rows(tables::LEARNING_EXPERIENCES).len(), 5);
        assert_eq!(recorder.stats().written, 5);
        assert_eq!(alerts.active_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = flaky(2);
        let alerts = Arc::new(AlertCenter::new());
        let recorder = ExperienceRecorder::spawn(store.clone(), alerts.clone(), fast_options(3));

        recorder.record(LearningExperience::new("u1", ExperienceType::ConceptReview, 5));
        recorder.shutdown().await;

        assert_eq!(store.inner.rows(tables::LEARNING_EXPERIENCES).len(), 1);
        assert_eq!(alerts.active_count(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_raise_alert() {
        let store = flaky(10);
        let alerts = Arc::new(AlertCenter::new());
        let recorder = ExperienceRecorder::spawn(store.clone(), alerts.clone(), fast_options(2));

        recorder.record(LearningExperience::new("u1", ExperienceType::ConceptReview, 5));
        recorder.shutdown().await;

        assert!(store.inner.rows(tables::LEARNING_EXPERIENCES).is_empty());
        assert_eq!(recorder.stats().failed, 1);
        let active = alerts.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Error);
    }

    #[tokio::test]
    async fn test_record_after_shutdown_is_dropped() {
        let recorder = ExperienceRecorder::spawn(flaky(0), Arc::new(AlertCenter::new()), fast_options(0));
        recorder.shutdown().await;
        recorder.record(LearningExperience::new("u1", ExperienceType::HintUsage, 1));
        assert_eq!(recorder.stats().dropped, 1);
    }
}
