//! Transcription worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipnote_media::{ChainConfig, DownloadChain};
use clipnote_queue::JobQueue;
use clipnote_store::{AdmissionConfig, AdmissionGate, JobRepository, RedisCollectionSink, StoreClient};
use clipnote_worker::{GeminiTranscriber, JobExecutor, ProcessingContext, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing: colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("clipnote=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting clipnote-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let store = match StoreClient::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create store client: {}", e);
            std::process::exit(1);
        }
    };

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
    };

    let http = match reqwest::Client::builder().build() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let transcriber = match GeminiTranscriber::new(http.clone(), config.malformed_policy) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to create transcriber: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = ProcessingContext {
        chain: DownloadChain::with_default_strategies(http, ChainConfig::from_env()),
        transcriber: Arc::new(transcriber),
        sink: Arc::new(RedisCollectionSink::new(store.clone())),
        gate: Arc::new(AdmissionGate::new(store.clone(), AdmissionConfig::from_env())),
        jobs: JobRepository::new(store),
        config,
    };

    let executor = Arc::new(JobExecutor::new(ctx, queue));

    // Shut down gracefully on ctrl-c
    let shutdown_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
