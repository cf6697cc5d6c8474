//! The per-job processing pipeline: acquire → transcribe → attach.
//!
//! Within one job the stages always run in this order; each carries its own
//! deadline. Credits are committed before the attach, with a compensating
//! refund if the attach then fails (saga-style compensation, not a
//! transaction). The same pipeline backs both the queue workers and the
//! API's synchronous direct-processing fallback.

use std::sync::Arc;

use tracing::{info, warn};

use clipnote_media::DownloadChain;
use clipnote_models::{
    ClipId, ClipResult, CreditOperation, JobRecord, Priority, PlanTier, Platform, Stage,
    StageProgress,
};
use clipnote_store::{AdmissionControl, CollectionSink, JobRepository};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::transcriber::Transcriber;

/// Everything a worker needs to process jobs. Constructed once at startup
/// and shared by reference; no ambient globals.
pub struct ProcessingContext {
    pub chain: DownloadChain,
    pub transcriber: Arc<dyn Transcriber>,
    pub sink: Arc<dyn CollectionSink>,
    pub gate: Arc<dyn AdmissionControl>,
    pub jobs: JobRepository,
    pub config: WorkerConfig,
}

/// Output of one successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub clip_id: ClipId,
    pub result: ClipResult,
}

/// Outcome of the direct-processing fallback.
#[derive(Debug, Clone)]
pub struct DirectOutcome {
    pub clip_id: ClipId,
    pub result: ClipResult,
}

/// Best-effort progress save; job progress is advisory and never fails an
/// attempt.
async fn save_progress(ctx: &ProcessingContext, record: &mut JobRecord, progress: StageProgress) {
    record.progress = progress;
    if let Err(e) = ctx.jobs.save(record).await {
        warn!(job_id = %record.id, error = %e, "Failed to save job progress");
    }
}

/// Run the acquire → transcribe → attach sequence for one attempt.
pub async fn run_pipeline(
    ctx: &ProcessingContext,
    record: &mut JobRecord,
) -> WorkerResult<PipelineOutput> {
    let operation = CreditOperation::Transcription;

    // Stage 1: acquire
    save_progress(
        ctx,
        record,
        StageProgress::at(Stage::Acquiring, 10, "Acquiring media"),
    )
    .await;

    let media = tokio::time::timeout(
        ctx.config.acquire_timeout,
        ctx.chain.acquire(&record.source_url, record.platform),
    )
    .await
    .map_err(|_| WorkerError::StageTimeout {
        stage: Stage::Acquiring,
        secs: ctx.config.acquire_timeout.as_secs(),
    })??;

    info!(
        job_id = %record.id,
        strategy = %media.strategy,
        hosted = media.hosted(),
        size = media.size_bytes,
        "Acquired media"
    );

    // Stage 2: transcribe
    save_progress(
        ctx,
        record,
        StageProgress::at(Stage::Transcribing, 45, "Transcribing"),
    )
    .await;

    let transcription = tokio::time::timeout(
        ctx.config.transcribe_timeout,
        ctx.transcriber.transcribe(&media),
    )
    .await
    .map_err(|_| WorkerError::StageTimeout {
        stage: Stage::Transcribing,
        secs: ctx.config.transcribe_timeout.as_secs(),
    })??;

    let title = record
        .title
        .clone()
        .or_else(|| media.metadata.title.clone())
        .unwrap_or_else(|| "Untitled clip".to_string());

    let result = ClipResult {
        platform: record.platform,
        title,
        transcript: transcription.transcript,
        components: transcription.components,
        degraded: transcription.degraded,
        source_url: record.source_url.clone(),
        strategy: media.strategy.clone(),
    };

    // Stage 3: commit credits, then attach. Gate failures are soft: the
    // degradation is logged and the job still completes.
    save_progress(
        ctx,
        record,
        StageProgress::at(Stage::Attaching, 80, "Saving to collection"),
    )
    .await;

    let committed = match ctx
        .gate
        .commit(&record.user_id, operation, record.plan, &record.id)
        .await
    {
        Ok(entry) => {
            info!(job_id = %record.id, entry_id = %entry.id, "Committed credits");
            true
        }
        Err(e) => {
            warn!(
                job_id = %record.id,
                error = %e,
                "Credit commit failed, continuing ungated"
            );
            false
        }
    };

    let attach = tokio::time::timeout(
        ctx.config.attach_timeout,
        ctx.sink
            .attach(&record.user_id, &record.collection_id, &record.id, &result),
    )
    .await;

    let attach_result = match attach {
        Ok(inner) => inner.map_err(|e| e.to_string()),
        Err(_) => Err(format!(
            "attach timed out after {} seconds",
            ctx.config.attach_timeout.as_secs()
        )),
    };

    match attach_result {
        Ok(clip_id) => Ok(PipelineOutput { clip_id, result }),
        Err(message) => {
            if committed {
                let amount = operation.cost();
                if let Err(e) = ctx
                    .gate
                    .refund(
                        &record.user_id,
                        amount,
                        "attach failed after charge",
                        record.plan,
                        &record.id,
                    )
                    .await
                {
                    warn!(job_id = %record.id, error = %e, "Compensating refund failed");
                }
            }
            Err(WorkerError::attach_failed(message, committed))
        }
    }
}

/// Synchronous direct-processing path for when the queue is unavailable.
///
/// Runs the same pipeline inline, without retries, and returns a definitive
/// outcome. A terminal job record is persisted best-effort so status queries
/// still work when the store is reachable.
#[allow(clippy::too_many_arguments)]
pub async fn process_direct(
    ctx: &ProcessingContext,
    user_id: &str,
    collection_id: &str,
    source_url: &str,
    title: Option<String>,
    platform: Platform,
    plan: PlanTier,
) -> WorkerResult<DirectOutcome> {
    let mut record = JobRecord::new(
        user_id,
        collection_id,
        source_url,
        title,
        platform,
        Priority::High,
    )
    .with_plan(plan)
    .start_attempt();

    info!(job_id = %record.id, "Processing job on direct path (queue unavailable)");

    match run_pipeline(ctx, &mut record).await {
        Ok(output) => {
            let completed = record.complete(output.result.clone());
            if let Err(e) = ctx.jobs.create(&completed).await {
                warn!(job_id = %completed.id, error = %e, "Failed to persist direct-path record");
            }
            Ok(DirectOutcome {
                clip_id: output.clip_id,
                result: output.result,
            })
        }
        Err(e) => {
            let mut job_error = clipnote_models::JobError::new(e.error_code(), e.to_string());
            if let WorkerError::AttachFailed {
                after_commit: true, ..
            } = &e
            {
                job_error = job_error.committed_but_unattached();
            }
            let failed = record.fail(job_error);
            if let Err(save_err) = ctx.jobs.create(&failed).await {
                warn!(job_id = %failed.id, error = %save_err, "Failed to persist direct-path record");
            }
            Err(e)
        }
    }
}
