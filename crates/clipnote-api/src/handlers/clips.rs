//! Clip submission, status, retry, and cancel handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clipnote_models::{
    ClipResult, CreditOperation, ErrorCode, JobError, JobId, JobRecord, JobStatus, Platform,
    PlatformError, Priority,
};
use clipnote_queue::{QueueError, TranscribeClipJob};
use clipnote_store::{AdmissionControl, CollectionSink};
use clipnote_worker::processor::process_direct;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

/// Body for POST /api/clips.
#[derive(Debug, Deserialize)]
pub struct EnqueueClipRequest {
    pub source_url: String,
    pub collection_id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// "normal" (default) or "high"
    #[serde(default)]
    pub priority: Option<String>,
}

/// 202 response when the job was queued.
#[derive(Debug, Serialize)]
pub struct EnqueueClipResponse {
    pub job_id: String,
    pub estimated_seconds: u64,
    pub queue_position: u64,
}

/// 201 response when the direct fallback processed the clip inline.
#[derive(Debug, Serialize)]
pub struct DirectClipResponse {
    pub clip_id: String,
    pub degraded: bool,
}

/// Progress block in the status response.
#[derive(Debug, Serialize)]
pub struct ProgressBody {
    pub stage: String,
    pub percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error block in the status response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub suggested_action: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub committed_but_unattached: bool,
}

/// GET /api/clips/:job_id/status response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub progress: ProgressBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ClipResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub can_retry: bool,
}

/// Query parameters for GET /api/clips.
#[derive(Debug, Deserialize)]
pub struct ListClipsQuery {
    /// Filter by status ("queued", "processing", "completed", "failed",
    /// "cancelled")
    #[serde(default)]
    pub status: Option<String>,
    /// Maximum jobs to return (clamped to 1..=100)
    #[serde(default)]
    pub limit: Option<u32>,
}

/// GET /api/clips response.
#[derive(Debug, Serialize)]
pub struct ListClipsResponse {
    pub jobs: Vec<JobStatusResponse>,
}

/// Body for PUT /api/clips/retry.
#[derive(Debug, Deserialize)]
pub struct RetryClipRequest {
    pub job_id: String,
    /// Reset the attempt budget even when exhausted
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct RetryClipResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct CancelClipResponse {
    pub success: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/clips
///
/// Validates the submission, runs admission (rate windows + credits), and
/// enqueues a transcription job. When the queue is unavailable the request
/// is processed synchronously instead, so the caller always gets a
/// definitive outcome.
///
/// Returns:
/// - 202: queued, with job id and queue position
/// - 201: processed inline via the direct fallback, with clip id
pub async fn enqueue_clip(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<EnqueueClipRequest>,
) -> ApiResult<Response> {
    // Synchronous validation; never blocks on the source platform
    let source_url = request.source_url.trim();
    if source_url.is_empty() {
        return Err(ApiError::validation(
            ErrorCode::MissingField,
            "source_url is required",
        ));
    }
    if request.collection_id.is_empty() {
        return Err(ApiError::validation(
            ErrorCode::MissingField,
            "collection_id is required",
        ));
    }

    let platform = Platform::from_url(source_url).map_err(|e| match e {
        PlatformError::InvalidUrl(_) => ApiError::validation(ErrorCode::InvalidUrl, e.to_string()),
        PlatformError::Unsupported(_) => {
            ApiError::validation(ErrorCode::UnsupportedPlatform, e.to_string())
        }
    })?;

    // Collection ownership is verified by the sink's access-check capability
    let owned = state
        .sink
        .check_access(&user.uid, &request.collection_id)
        .await
        .map_err(|e| ApiError::internal(format!("Access check failed: {e}")))?;
    if !owned {
        return Err(ApiError::not_found("Collection not found"));
    }

    // Admission: rate windows + credit balance. Nothing is deducted here.
    let decision = state
        .gate
        .reserve(&user.uid, CreditOperation::Transcription, user.plan)
        .await;

    if decision.degraded {
        warn!(user_id = %user.uid, "Admission gate degraded, request admitted ungated");
    }

    if !decision.allowed {
        let (code, message) = decision
            .denial
            .unwrap_or((ErrorCode::Internal, "Admission denied".to_string()));
        return Err(ApiError::Denied {
            code,
            message,
            retry_after: decision.retry_after.map(|d| d.as_secs().max(1)),
            credits_remaining: Some(decision.credits_remaining),
        });
    }

    let priority = match request.priority.as_deref() {
        Some("high") => Priority::High,
        _ => Priority::Normal,
    };

    let record = JobRecord::new(
        &user.uid,
        &request.collection_id,
        source_url,
        request.title.clone(),
        platform,
        priority,
    )
    .with_plan(user.plan);

    // Persist the record, then enqueue. If either hits unavailable queue
    // infrastructure, fall back to processing the clip inline.
    if let Err(e) = state.jobs.create(&record).await {
        warn!(error = %e, "Job store unavailable, falling back to direct processing");
        return direct_fallback(&state, &user, &request, platform).await;
    }

    let queue_job = TranscribeClipJob::new(
        record.id.clone(),
        &user.uid,
        &request.collection_id,
        source_url,
        platform,
    )
    .with_title(request.title.clone())
    .with_priority(priority)
    .with_plan(user.plan);

    match state.queue.enqueue(&queue_job).await {
        Ok(_) => {
            let queue_position = state.queue.queue_position(priority).await.unwrap_or(0);
            metrics::record_job_enqueued(priority.as_str());
            info!(job_id = %record.id, user_id = %user.uid, "Queued clip submission");

            Ok((
                StatusCode::ACCEPTED,
                Json(EnqueueClipResponse {
                    job_id: record.id.to_string(),
                    estimated_seconds: state.config.estimated_job_seconds
                        * queue_position.max(1),
                    queue_position,
                }),
            )
                .into_response())
        }
        Err(QueueError::Duplicate(key)) => {
            // The record we just created will never be dispatched
            let abandoned = record.fail(JobError::new(
                ErrorCode::Internal,
                "duplicate submission",
            ));
            state.jobs.save(&abandoned).await.ok();
            Err(ApiError::conflict(format!(
                "An identical submission is already in flight ({key})"
            )))
        }
        Err(e) => {
            warn!(error = %e, "Queue unavailable, falling back to direct processing");
            let abandoned = record.fail(JobError::new(
                ErrorCode::QueueUnavailable,
                "queue unavailable at enqueue; processed directly",
            ));
            state.jobs.save(&abandoned).await.ok();
            direct_fallback(&state, &user, &request, platform).await
        }
    }
}

/// Guaranteed-outcome path: run the pipeline inline, no retries.
async fn direct_fallback(
    state: &AppState,
    user: &AuthUser,
    request: &EnqueueClipRequest,
    platform: Platform,
) -> ApiResult<Response> {
    metrics::record_direct_fallback();

    let outcome = process_direct(
        &state.processing,
        &user.uid,
        &request.collection_id,
        request.source_url.trim(),
        request.title.clone(),
        platform,
        user.plan,
    )
    .await?;

    info!(
        user_id = %user.uid,
        clip_id = %outcome.clip_id,
        "Processed clip via direct fallback"
    );

    Ok((
        StatusCode::CREATED,
        Json(DirectClipResponse {
            clip_id: outcome.clip_id.to_string(),
            degraded: outcome.result.degraded,
        }),
    )
        .into_response())
}

/// GET /api/clips/:job_id/status
///
/// Ownership-checked: a job owned by another user is reported as not found.
pub async fn get_clip_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<JobStatusResponse>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::validation(
            ErrorCode::MissingField,
            "Invalid job ID format",
        ));
    }

    let record = state
        .jobs
        .get_owned(&JobId::from_string(job_id), &user.uid)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(status_response(record)))
}

fn status_response(record: JobRecord) -> JobStatusResponse {
    let can_retry = record.status == JobStatus::Failed;
    JobStatusResponse {
        job_id: record.id.to_string(),
        status: record.status.as_str().to_string(),
        progress: ProgressBody {
            stage: record.progress.stage.as_str().to_string(),
            percentage: record.progress.percentage,
            message: record.progress.message,
        },
        result: record.result,
        error: record.last_error.map(|e| ErrorBody {
            code: e.code.as_str().to_string(),
            message: e.message,
            suggested_action: e.suggested_action,
            committed_but_unattached: e.committed_but_unattached,
        }),
        can_retry,
    }
}

/// GET /api/clips
///
/// Lists the caller's jobs, newest first, optionally filtered by status.
pub async fn list_clips(
    State(state): State<AppState>,
    Query(query): Query<ListClipsQuery>,
    user: AuthUser,
) -> ApiResult<Json<ListClipsResponse>> {
    let status = match query.status.as_deref() {
        None => None,
        Some("queued") => Some(JobStatus::Queued),
        Some("processing") => Some(JobStatus::Processing),
        Some("completed") => Some(JobStatus::Completed),
        Some("failed") => Some(JobStatus::Failed),
        Some("cancelled") => Some(JobStatus::Cancelled),
        Some(other) => {
            return Err(ApiError::validation(
                ErrorCode::MissingField,
                format!("Unknown status filter: {other}"),
            ))
        }
    };

    let limit = query.limit.unwrap_or(20).clamp(1, 100) as usize;
    let records = state.jobs.list_for_user(&user.uid, status, limit).await?;

    Ok(Json(ListClipsResponse {
        jobs: records.into_iter().map(status_response).collect(),
    }))
}

/// PUT /api/clips/retry
///
/// Re-enqueues a failed job. A job that is not failed is a no-op returning
/// `success: false`.
pub async fn retry_clip(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RetryClipRequest>,
) -> ApiResult<Json<RetryClipResponse>> {
    let job_id = JobId::from_string(request.job_id);

    let record = state
        .jobs
        .get_owned(&job_id, &user.uid)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    if !record.can_retry(request.force) {
        return Ok(Json(RetryClipResponse { success: false }));
    }

    let requeued = record.user_retry(request.force);
    state.jobs.save(&requeued).await?;

    let queue_job = TranscribeClipJob::new(
        requeued.id.clone(),
        &requeued.user_id,
        &requeued.collection_id,
        &requeued.source_url,
        requeued.platform,
    )
    .with_title(requeued.title.clone())
    .with_priority(requeued.priority)
    .with_plan(requeued.plan);

    match state.queue.enqueue(&queue_job).await {
        Ok(_) => {
            info!(job_id = %requeued.id, retry_count = requeued.retry_count, "Re-enqueued job");
            Ok(Json(RetryClipResponse { success: true }))
        }
        Err(QueueError::Duplicate(_)) => Ok(Json(RetryClipResponse { success: false })),
        Err(e) => Err(ApiError::internal(format!("Failed to re-enqueue: {e}"))),
    }
}

/// DELETE /api/clips/:job_id
///
/// Cancels a still-queued job. In-flight jobs cannot be interrupted.
pub async fn cancel_clip(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<CancelClipResponse>> {
    let job_id = JobId::from_string(job_id);
    state.jobs.cancel_if_queued(&job_id, &user.uid).await?;
    Ok(Json(CancelClipResponse { success: true }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Validate job ID format to prevent key injection.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
fn is_valid_job_id(id: &str) -> bool {
    if id.len() < 8 || id.len() > 64 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_models::{Platform, Priority, StageProgress};

    #[test]
    fn valid_job_ids() {
        assert!(is_valid_job_id("12345678"));
        assert!(is_valid_job_id("a1b2c3d4-e5f6-7890-abcd-ef1234567890"));
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("short"));
        assert!(!is_valid_job_id("has space"));
        assert!(!is_valid_job_id("has_underscore"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }

    #[test]
    fn status_response_reflects_failed_job() {
        let record = JobRecord::new(
            "user-1",
            "col-1",
            "https://www.tiktok.com/@a/video/1",
            None,
            Platform::Tiktok,
            Priority::Normal,
        )
        .start_attempt()
        .fail(JobError::new(ErrorCode::ContentUnavailable, "private video"));

        let response = status_response(record);
        assert_eq!(response.status, "failed");
        assert!(response.can_retry);
        let error = response.error.expect("error present");
        assert_eq!(error.code, "content-unavailable");
        assert!(!error.suggested_action.is_empty());
    }

    #[test]
    fn status_response_reflects_progress() {
        let mut record = JobRecord::new(
            "user-1",
            "col-1",
            "https://www.tiktok.com/@a/video/1",
            None,
            Platform::Tiktok,
            Priority::Normal,
        )
        .start_attempt();
        record.progress = StageProgress::at(
            clipnote_models::Stage::Transcribing,
            45,
            "Transcribing",
        );

        let response = status_response(record);
        assert_eq!(response.status, "processing");
        assert_eq!(response.progress.stage, "transcribing");
        assert_eq!(response.progress.percentage, 45);
        assert!(!response.can_retry);
    }
}
