//! Job definitions and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::credit::PlanTier;
use crate::error_code::ErrorCode;
use crate::platform::Platform;
use crate::transcript::ClipResult;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a clip attached to a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job priority. High-priority jobs are dispatched before normal ones;
/// within a priority jobs are processed oldest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue
    #[default]
    Queued,
    /// Job is being processed by a worker
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with a recorded error
    Failed,
    /// Job was cancelled before dispatch
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states receive no further updates.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stage a job is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Queued,
    Acquiring,
    Transcribing,
    Attaching,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Acquiring => "acquiring",
            Stage::Transcribing => "transcribing",
            Stage::Attaching => "attaching",
            Stage::Done => "done",
        }
    }
}

/// Progress snapshot for status polling.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StageProgress {
    /// Current pipeline stage
    pub stage: Stage,
    /// Progress percentage (0-100)
    pub percentage: u8,
    /// Human-readable step description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StageProgress {
    pub fn at(stage: Stage, percentage: u8, message: impl Into<String>) -> Self {
        Self {
            stage,
            percentage: percentage.min(100),
            message: Some(message.into()),
        }
    }
}

/// Error recorded on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Stable error code from the taxonomy
    pub code: ErrorCode,
    /// Verbatim error message from the failing stage
    pub message: String,
    /// Suggested next action for the user
    pub suggested_action: String,
    /// Set when credits were committed but the collection attach failed.
    /// A compensating refund was issued; flagged for operator visibility.
    #[serde(default)]
    pub committed_but_unattached: bool,
}

impl JobError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggested_action: code.suggested_action().to_string(),
            committed_but_unattached: false,
        }
    }

    pub fn committed_but_unattached(mut self) -> Self {
        self.committed_but_unattached = true;
        self
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// A media acquisition + transcription job.
///
/// The record is exclusively owned by the queue; only the worker currently
/// holding the job mutates it, and terminal states are immutable except via
/// an explicit retry request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job ID
    pub id: JobId,

    /// Owning user
    pub user_id: String,

    /// Target collection to attach the result to
    pub collection_id: String,

    /// Submitted media URL
    pub source_url: String,

    /// Optional user-supplied title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Platform derived from the URL
    pub platform: Platform,

    /// Dispatch priority
    #[serde(default)]
    pub priority: Priority,

    /// Owner's plan tier at submission time (drives credit period/limits)
    #[serde(default)]
    pub plan: PlanTier,

    /// Lifecycle state
    #[serde(default)]
    pub status: JobStatus,

    /// Attempts consumed (bounded by `max_attempts`)
    #[serde(default)]
    pub attempt_count: u32,

    /// Maximum processing attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Explicit user-requested retries, counted separately from attempts
    #[serde(default)]
    pub retry_count: u32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// When processing first started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Last error (recorded verbatim for user display)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<JobError>,

    /// Result, populated on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ClipResult>,

    /// Progress snapshot for polling
    #[serde(default)]
    pub progress: StageProgress,

    /// Idempotency key for enqueue deduplication
    pub idempotency_key: String,
}

impl JobRecord {
    /// Create a new queued job.
    pub fn new(
        user_id: impl Into<String>,
        collection_id: impl Into<String>,
        source_url: impl Into<String>,
        title: Option<String>,
        platform: Platform,
        priority: Priority,
    ) -> Self {
        let user_id = user_id.into();
        let collection_id = collection_id.into();
        let source_url = source_url.into();
        let id = JobId::new();
        let now = Utc::now();

        Self {
            idempotency_key: format!("transcribe:{}:{}:{}", user_id, collection_id, source_url),
            id,
            user_id,
            collection_id,
            source_url,
            title,
            platform,
            priority,
            plan: PlanTier::default(),
            status: JobStatus::Queued,
            attempt_count: 0,
            max_attempts: default_max_attempts(),
            retry_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            last_error: None,
            result: None,
            progress: StageProgress::default(),
        }
    }

    /// Set the owner's plan tier.
    pub fn with_plan(mut self, plan: PlanTier) -> Self {
        self.plan = plan;
        self
    }

    /// Transition to processing and consume one attempt.
    pub fn start_attempt(mut self) -> Self {
        self.status = JobStatus::Processing;
        self.attempt_count += 1;
        let now = Utc::now();
        self.started_at.get_or_insert(now);
        self.updated_at = now;
        self
    }

    /// Mark the job as completed with its result.
    pub fn complete(mut self, result: ClipResult) -> Self {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self.progress = StageProgress::at(Stage::Done, 100, "Complete");
        self
    }

    /// Mark the job as failed with a terminal error.
    pub fn fail(mut self, error: JobError) -> Self {
        self.status = JobStatus::Failed;
        self.last_error = Some(error);
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Return a failed attempt to the queue for a retry.
    pub fn requeue(mut self, error: JobError) -> Self {
        self.status = JobStatus::Queued;
        self.last_error = Some(error);
        self.updated_at = Utc::now();
        self.progress = StageProgress::default();
        self
    }

    /// Cancel a still-queued job.
    pub fn cancel(mut self) -> Self {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.updated_at = Utc::now();
        self
    }

    /// Re-enqueue after an explicit user retry request.
    ///
    /// `force` resets the attempt budget; otherwise remaining budget is
    /// required (checked by `can_retry`).
    pub fn user_retry(mut self, force: bool) -> Self {
        self.status = JobStatus::Queued;
        self.retry_count += 1;
        if force {
            self.attempt_count = 0;
        }
        self.last_error = None;
        self.completed_at = None;
        self.updated_at = Utc::now();
        self.progress = StageProgress::default();
        self
    }

    /// Whether the job has attempt budget left for automatic retries.
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Whether an explicit retry request is currently allowed.
    pub fn can_retry(&self, force: bool) -> bool {
        self.status == JobStatus::Failed && (force || self.has_attempts_remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{ClipResult, ScriptComponents};

    fn sample_result() -> ClipResult {
        ClipResult {
            platform: Platform::Tiktok,
            title: "test".into(),
            transcript: "hello".into(),
            components: ScriptComponents::default(),
            degraded: false,
            source_url: "https://www.tiktok.com/@a/video/1".into(),
            strategy: "tikwm".into(),
        }
    }

    fn sample_job() -> JobRecord {
        JobRecord::new(
            "user-1",
            "col-1",
            "https://www.tiktok.com/@a/video/1",
            None,
            Platform::Tiktok,
            Priority::Normal,
        )
    }

    #[test]
    fn job_starts_queued_with_zero_attempts() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempt_count, 0);
        assert!(job.idempotency_key.starts_with("transcribe:user-1:"));
    }

    #[test]
    fn attempt_count_never_exceeds_max_without_failure() {
        let mut job = sample_job();
        for _ in 0..job.max_attempts {
            job = job.start_attempt();
            assert!(job.attempt_count <= job.max_attempts);
            job = job.requeue(JobError::new(ErrorCode::AcquisitionFailed, "network"));
        }
        assert!(!job.has_attempts_remaining());
    }

    #[test]
    fn completed_job_has_result() {
        let job = sample_job().start_attempt().complete(sample_result());
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.is_some());
        assert_eq!(job.progress.percentage, 100);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn retry_only_allowed_on_failed_jobs() {
        let job = sample_job();
        assert!(!job.can_retry(false));

        let failed = job
            .start_attempt()
            .fail(JobError::new(ErrorCode::ContentUnavailable, "gone"));
        assert!(failed.can_retry(false));

        let exhausted = JobRecord {
            attempt_count: 3,
            ..failed.clone()
        };
        assert!(!exhausted.can_retry(false));
        assert!(exhausted.can_retry(true));
    }

    #[test]
    fn user_retry_resets_state() {
        let failed = sample_job()
            .start_attempt()
            .fail(JobError::new(ErrorCode::AcquisitionFailed, "timeout"));
        let retried = failed.user_retry(true);

        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.attempt_count, 0);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.last_error.is_none());
    }

    #[test]
    fn cancelled_is_terminal() {
        let job = sample_job().cancel();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn job_record_serde_roundtrip() {
        let job = sample_job()
            .start_attempt()
            .fail(JobError::new(ErrorCode::ContentUnavailable, "private video").committed_but_unattached());

        let json = serde_json::to_string(&job).expect("serialize JobRecord");
        let decoded: JobRecord = serde_json::from_str(&json).expect("deserialize JobRecord");

        assert_eq!(decoded.id, job.id);
        assert_eq!(decoded.status, JobStatus::Failed);
        let err = decoded.last_error.expect("error present");
        assert_eq!(err.code, ErrorCode::ContentUnavailable);
        assert!(err.committed_but_unattached);
    }
}
