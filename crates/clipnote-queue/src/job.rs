//! Queue job payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clipnote_models::{JobId, PlanTier, Platform, Priority};

/// Job to acquire, transcribe, and attach one submitted clip.
///
/// This is the queue payload only; the authoritative lifecycle record lives
/// in the job store, keyed by `job_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeClipJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Owning user
    pub user_id: String,
    /// Target collection
    pub collection_id: String,
    /// Submitted media URL
    pub source_url: String,
    /// Platform derived from the URL
    pub platform: Platform,
    /// Optional user-supplied title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Dispatch priority
    #[serde(default)]
    pub priority: Priority,
    /// Owner's plan tier at submission time
    #[serde(default)]
    pub plan: PlanTier,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl TranscribeClipJob {
    pub fn new(
        job_id: JobId,
        user_id: impl Into<String>,
        collection_id: impl Into<String>,
        source_url: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            job_id,
            user_id: user_id.into(),
            collection_id: collection_id.into(),
            source_url: source_url.into(),
            platform,
            title: None,
            priority: Priority::Normal,
            plan: PlanTier::default(),
            created_at: Utc::now(),
        }
    }

    /// Set the plan tier.
    pub fn with_plan(mut self, plan: PlanTier) -> Self {
        self.plan = plan;
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Generate idempotency key for deduplication.
    ///
    /// Keyed by submission content, not job ID, so an identical in-flight
    /// submission is rejected rather than processed twice.
    pub fn idempotency_key(&self) -> String {
        format!(
            "transcribe:{}:{}:{}",
            self.user_id, self.collection_id, self.source_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcribe_job_serde_roundtrip() {
        let job = TranscribeClipJob::new(
            JobId::new(),
            "user_1",
            "col_1",
            "https://www.tiktok.com/@a/video/1",
            Platform::Tiktok,
        )
        .with_priority(Priority::High)
        .with_title(Some("my clip".into()));

        let json = serde_json::to_string(&job).expect("serialize job");
        let decoded: TranscribeClipJob = serde_json::from_str(&json).expect("deserialize job");

        assert_eq!(decoded.job_id, job.job_id);
        assert_eq!(decoded.priority, Priority::High);
        assert_eq!(decoded.title.as_deref(), Some("my clip"));
        assert_eq!(decoded.idempotency_key(), job.idempotency_key());
    }
}
