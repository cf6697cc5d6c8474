//! Job executor.
//!
//! A bounded set of workers pulls jobs from the queue (high priority first),
//! establishes exclusive ownership through the store's Queued → Processing
//! transition, and runs the processing pipeline. Retryable failures go back
//! through the delayed set with exponential backoff; terminal ones land on
//! the DLQ with the error recorded on the job.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use clipnote_models::JobError;
use clipnote_queue::{ConsumedJob, JobQueue};

use crate::error::{WorkerError, WorkerResult};
use crate::processor::{run_pipeline, ProcessingContext};

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    ctx: Arc<ProcessingContext>,
    queue: Arc<JobQueue>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(ctx: ProcessingContext, queue: JobQueue) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            ctx: Arc::new(ctx),
            queue: Arc::new(queue),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.ctx.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Pump task: move due delayed jobs back onto their streams
        let queue_clone = Arc::clone(&self.queue);
        let pump_interval = self.ctx.config.pump_interval;
        let mut shutdown_rx_pump = self.shutdown.subscribe();

        let pump_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(pump_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_pump.changed() => {
                        if *shutdown_rx_pump.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.pump_delayed().await {
                            Ok(moved) if moved > 0 => {
                                debug!("Pumped {} delayed jobs back onto streams", moved);
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Failed to pump delayed jobs: {}", e);
                            }
                        }
                    }
                }
            }
        });

        // Main job consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        pump_task.abort();

        // Wait for in-flight jobs to complete
        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(Duration::from_secs(60), self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and dispatch jobs up to the free worker slots.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(
                &self.consumer_name,
                self.ctx.config.consume_block_ms,
                available.min(5),
            )
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for consumed in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, consumed).await;
            });
        }

        Ok(())
    }

    /// Execute a single job with retry/backoff and DLQ handling.
    async fn execute_job(ctx: Arc<ProcessingContext>, queue: Arc<JobQueue>, consumed: ConsumedJob) {
        let ConsumedJob {
            stream,
            message_id,
            job,
        } = consumed;
        let job_id = job.job_id.clone();

        // Sole mutual-exclusion point: Queued -> Processing. A job that is
        // cancelled, missing, or already claimed is acked and skipped.
        let mut record = match ctx.jobs.claim_for_processing(&job_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!(job_id = %job_id, "Job not claimable (cancelled or already owned), skipping");
                queue.ack(&stream, &message_id).await.ok();
                queue.clear_dedup(&job).await.ok();
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to claim job, leaving for redelivery");
                return;
            }
        };

        info!(
            job_id = %job_id,
            attempt = record.attempt_count,
            max_attempts = record.max_attempts,
            "Executing job"
        );

        let result = run_pipeline(&ctx, &mut record).await;
        ctx.jobs.release_claim(&job_id).await.ok();

        match result {
            Ok(output) => {
                let completed = record.complete(output.result);
                if let Err(e) = ctx.jobs.save(&completed).await {
                    error!(job_id = %job_id, error = %e, "Failed to save completed job");
                }
                if let Err(e) = queue.ack(&stream, &message_id).await {
                    error!(job_id = %job_id, error = %e, "Failed to ack job");
                }
                queue.clear_dedup(&job).await.ok();
                metrics::counter!("clipnote_jobs_completed_total").increment(1);
                info!(job_id = %job_id, clip_id = %output.clip_id, "Job completed");
            }
            Err(e) => {
                let retryable = e.is_retryable() && record.has_attempts_remaining();
                let mut job_error = JobError::new(e.error_code(), e.to_string());
                if let WorkerError::AttachFailed {
                    after_commit: true, ..
                } = &e
                {
                    job_error = job_error.committed_but_unattached();
                }

                if retryable {
                    let delay = ctx.config.backoff_for_attempt(record.attempt_count);
                    warn!(
                        job_id = %job_id,
                        attempt = record.attempt_count,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Job attempt failed, scheduling retry"
                    );

                    let requeued = record.requeue(job_error);
                    if let Err(save_err) = ctx.jobs.save(&requeued).await {
                        error!(job_id = %job_id, error = %save_err, "Failed to save requeued job");
                    }
                    if let Err(retry_err) = queue.schedule_retry(&job, delay).await {
                        error!(job_id = %job_id, error = %retry_err, "Failed to schedule retry");
                    }
                    queue.ack(&stream, &message_id).await.ok();
                    metrics::counter!("clipnote_jobs_retried_total").increment(1);
                } else {
                    error!(job_id = %job_id, error = %e, "Job failed terminally");

                    let failed = record.fail(job_error);
                    if let Err(save_err) = ctx.jobs.save(&failed).await {
                        error!(job_id = %job_id, error = %save_err, "Failed to save failed job");
                    }
                    if let Err(dlq_err) = queue
                        .dlq(&stream, &message_id, &job, &e.to_string())
                        .await
                    {
                        error!(job_id = %job_id, error = %dlq_err, "Failed to move job to DLQ");
                    }
                    // Clear dedup so the user can resubmit or retry
                    queue.clear_dedup(&job).await.ok();
                    metrics::counter!("clipnote_jobs_failed_total").increment(1);
                }
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.ctx.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
