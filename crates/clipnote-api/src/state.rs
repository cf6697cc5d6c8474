//! Application state.

use std::sync::Arc;

use clipnote_media::{ChainConfig, DownloadChain};
use clipnote_queue::JobQueue;
use clipnote_store::{
    AdmissionConfig, AdmissionControl, AdmissionGate, CreditLedger, JobRepository,
    RedisCollectionSink, StoreClient,
};
use clipnote_worker::{GeminiTranscriber, ProcessingContext, WorkerConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobRepository,
    pub queue: Arc<JobQueue>,
    pub gate: Arc<dyn AdmissionControl>,
    pub ledger: CreditLedger,
    pub sink: Arc<RedisCollectionSink>,
    /// Pipeline context for the synchronous direct-processing fallback
    pub processing: Arc<ProcessingContext>,
}

impl AppState {
    /// Create new application state. All backend clients are constructed
    /// once here and injected; nothing reaches for globals later.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = StoreClient::from_env()?;
        let queue = JobQueue::from_env()?;
        queue.init().await.ok(); // queue may be down; enqueue falls back

        let http = reqwest::Client::builder().build()?;
        let worker_config = WorkerConfig::from_env();

        let sink = Arc::new(RedisCollectionSink::new(store.clone()));
        let gate = Arc::new(AdmissionGate::new(store.clone(), AdmissionConfig::from_env()));
        let jobs = JobRepository::new(store.clone());

        let transcriber = GeminiTranscriber::new(http.clone(), worker_config.malformed_policy)?;

        let processing = Arc::new(ProcessingContext {
            chain: DownloadChain::with_default_strategies(http, ChainConfig::from_env()),
            transcriber: Arc::new(transcriber),
            sink: Arc::clone(&sink) as Arc<dyn clipnote_store::CollectionSink>,
            gate: Arc::clone(&gate) as Arc<dyn AdmissionControl>,
            jobs: jobs.clone(),
            config: worker_config,
        });

        Ok(Self {
            config,
            jobs,
            queue: Arc::new(queue),
            ledger: gate.ledger().clone(),
            gate,
            sink,
            processing,
        })
    }
}
