use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::cache::TtlCache;
use crate::config::Config;
use crate::db::{self, DataStore};
use crate::services::alerts::AlertCenter;
use crate::services::experience::{ExperienceRecorder, RecorderOptions};
use crate::services::llm_provider::{CachedCompletions, CompletionService, LLMProvider};
use crate::services::tutor::TutorService;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    config: Arc<Config>,
    store: Arc<dyn DataStore>,
    completion_cache: Arc<TtlCache<String, String>>,
    alerts: Arc<AlertCenter>,
    recorder: Arc<ExperienceRecorder>,
    tutor: Arc<TutorService>,
    llm_configured: bool,
}

impl AppState {
    /// Wires the services around the given store and completion backend.
    /// Spawns the experience writer, so it must run inside a tokio runtime.
    pub fn new(config: Config, store: Arc<dyn DataStore>, llm: Arc<dyn CompletionService>) -> Self {
        let completion_cache = Arc::new(TtlCache::with_jitter());
        let llm: Arc<dyn CompletionService> = Arc::new(CachedCompletions::new(
            llm,
            Arc::clone(&completion_cache),
            config.completion_cache_ttl,
        ));

        let alerts = Arc::new(AlertCenter::new());
        let recorder = Arc::new(ExperienceRecorder::spawn(
            Arc::clone(&store),
            Arc::clone(&alerts),
            RecorderOptions {
                capacity: config.recorder_queue_capacity,
                max_retries: config.recorder_max_retries,
                ..RecorderOptions::default()
            },
        ));

        let tutor = Arc::new(TutorService::new(
            Arc::new(crate::learning::SessionRegistry::new()),
            llm,
            Arc::clone(&recorder),
            config.initial_difficulty,
        ));

        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            config: Arc::new(config),
            store,
            completion_cache,
            alerts,
            recorder,
            tutor,
            llm_configured: true,
        }
    }

    /// Production wiring: REST or in-memory store, LLM provider from env.
    pub fn from_config(config: Config) -> Self {
        let store = db::connect(&config);
        let provider = LLMProvider::from_env();
        let llm_configured = provider.is_available();
        if !llm_configured {
            tracing::warn!("LLM_API_KEY not set, tutor replies will report the service as unavailable");
        }

        let mut state = Self::new(config, store, Arc::new(provider));
        state.llm_configured = llm_configured;
        state
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub fn store(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.store)
    }

    pub fn completion_cache(&self) -> Arc<TtlCache<String, String>> {
        Arc::clone(&self.completion_cache)
    }

    pub fn alerts(&self) -> Arc<AlertCenter> {
        Arc::clone(&self.alerts)
    }

    pub fn recorder(&self) -> Arc<ExperienceRecorder> {
        Arc::clone(&self.recorder)
    }

    pub fn tutor(&self) -> Arc<TutorService> {
        Arc::clone(&self.tutor)
    }

    pub fn llm_configured(&self) -> bool {
        self.llm_configured
    }
}
