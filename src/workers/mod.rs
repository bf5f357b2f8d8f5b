mod cache_sweep;
mod session_cleanup;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::cache::TtlCache;
use crate::services::tutor::TutorService;
use crate::state::AppState;

const EVERY_MINUTE: &str = "0 * * * * *";

pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    running: AtomicBool,
    enabled: bool,
    tutor: Arc<TutorService>,
    completion_cache: Arc<TtlCache<String, String>>,
    session_idle_timeout: chrono::Duration,
}

impl WorkerManager {
    pub async fn new(state: &AppState) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await.map_err(WorkerError::Scheduler)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = state.config();
        let session_idle_timeout = chrono::Duration::from_std(config.session_idle_timeout)
            .map_err(|e| WorkerError::Config(format!("session idle timeout out of range: {e}")))?;

        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            running: AtomicBool::new(false),
            enabled: config.workers_enabled,
            tutor: state.tutor(),
            completion_cache: state.completion_cache(),
            session_idle_timeout,
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        if !self.enabled {
            info!("WORKERS_ENABLED is off, skipping worker startup");
            return Ok(());
        }

        let scheduler = self.scheduler.lock().await;

        {
            let cache = Arc::clone(&self.completion_cache);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(EVERY_MINUTE, move |_uuid, _lock| {
                let cache = Arc::clone(&cache);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        _ = async { cache_sweep::sweep_completion_cache(&cache) } => {}
                    }
                })
            })
            .map_err(WorkerError::Scheduler)?;
            scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
            info!("Completion cache sweep scheduled (every minute)");
        }

        {
            let tutor = Arc::clone(&self.tutor);
            let max_idle = self.session_idle_timeout;
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(EVERY_MINUTE, move |_uuid, _lock| {
                let tutor = Arc::clone(&tutor);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        result = async { session_cleanup::end_idle_sessions(&tutor, max_idle) } => {
                            if let Err(e) = result {
                                error!(error = %e, "Idle session cleanup error");
                            }
                        }
                    }
                })
            })
            .map_err(WorkerError::Scheduler)?;
            scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
            info!(idle_minutes = max_idle.num_minutes(), "Idle session cleanup scheduled (every minute)");
        }

        scheduler.start().await.map_err(WorkerError::Scheduler)?;
        self.running.store(true, Ordering::Relaxed);
        info!("All workers started");

        Ok(())
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }
        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Configuration error: {0}")]
    Config(String),
}
