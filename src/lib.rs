pub mod api;
pub mod config;
pub mod counter;
pub mod error;
pub mod gcp;
pub mod llm;
pub mod prompt;
pub mod summary;
pub mod telemetry;
pub mod warehouse;

use std::sync::Arc;
use config::Config;
use counter::{CounterStore, FirestoreCounterStore, MemoryCounterStore};
use error::{AppError, Result};
use gcp::TokenSource;
use llm::SummaryGenerator;
use warehouse::{BigQueryStore, ReleaseNoteStore};
use api::rate_limit::RateLimiter;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub notes: Arc<dyn ReleaseNoteStore>,
    pub counter: Arc<dyn CounterStore>,
    pub summarizer: Arc<SummaryGenerator>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        config: Config,
        notes: Arc<dyn ReleaseNoteStore>,
        counter: Arc<dyn CounterStore>,
        summarizer: SummaryGenerator,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self {
            config: Arc::new(config),
            notes,
            counter,
            summarizer: Arc::new(summarizer),
            limiter,
        }
    }

    /// Wires the Google Cloud backed collaborators described by `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let tokens = TokenSource::from_config(config.access_token.as_deref());

        let notes = BigQueryStore::new(http.clone(), config.warehouse.clone(), tokens.clone());

        let counter: Arc<dyn CounterStore> =
            match FirestoreCounterStore::from_config(http, &config.counter, tokens) {
                Some(store) => Arc::new(store),
                None => Arc::new(MemoryCounterStore::new()),
            };

        let summarizer = SummaryGenerator::from_config(&config.gemini)
            .map_err(|e| AppError::Config(format!("Failed to build generative API client: {}", e)))?;

        Ok(Self::new(config, Arc::new(notes), counter, summarizer))
    }

    pub fn verbose_errors(&self) -> bool {
        self.config.environment.is_verbose()
    }
}
