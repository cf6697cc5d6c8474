//! Collection sink capability.
//!
//! The sink is an external collaborator from the queue's point of view: it
//! is consumed only through the [`CollectionSink`] trait. The Redis-backed
//! implementation here is the reference sink the binaries wire in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::info;

use clipnote_models::{ClipId, ClipResult, JobId};

use crate::client::StoreClient;
use crate::error::StoreResult;

/// Capability for attaching completed results to a user's collection.
#[async_trait]
pub trait CollectionSink: Send + Sync {
    /// Whether `collection_id` exists and is owned by `user_id`.
    async fn check_access(&self, user_id: &str, collection_id: &str) -> StoreResult<bool>;

    /// Durably attach a completed result. Called exactly once per
    /// successfully processed job.
    async fn attach(
        &self,
        user_id: &str,
        collection_id: &str,
        job_id: &JobId,
        result: &ClipResult,
    ) -> StoreResult<ClipId>;
}

/// A clip as stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredClip {
    clip_id: ClipId,
    job_id: JobId,
    user_id: String,
    collection_id: String,
    result: ClipResult,
    attached_at: DateTime<Utc>,
}

fn collections_key(user_id: &str) -> String {
    format!("clipnote:collections:{}", user_id)
}

fn collection_clips_key(user_id: &str, collection_id: &str) -> String {
    format!("clipnote:collection-clips:{}:{}", user_id, collection_id)
}

fn clip_key(clip_id: &ClipId) -> String {
    format!("clipnote:clip:{}", clip_id)
}

/// Redis-backed reference sink.
#[derive(Clone)]
pub struct RedisCollectionSink {
    client: StoreClient,
}

impl RedisCollectionSink {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Register a collection for a user (provisioning path used by the
    /// external collection service and tests).
    pub async fn create_collection(&self, user_id: &str, collection_id: &str) -> StoreResult<()> {
        let mut conn = self.client.conn().await?;
        conn.sadd::<_, _, ()>(collections_key(user_id), collection_id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CollectionSink for RedisCollectionSink {
    async fn check_access(&self, user_id: &str, collection_id: &str) -> StoreResult<bool> {
        let mut conn = self.client.conn().await?;
        let owned: bool = conn
            .sismember(collections_key(user_id), collection_id)
            .await?;
        Ok(owned)
    }

    async fn attach(
        &self,
        user_id: &str,
        collection_id: &str,
        job_id: &JobId,
        result: &ClipResult,
    ) -> StoreResult<ClipId> {
        let clip_id = ClipId::new();
        let stored = StoredClip {
            clip_id: clip_id.clone(),
            job_id: job_id.clone(),
            user_id: user_id.to_string(),
            collection_id: collection_id.to_string(),
            result: result.clone(),
            attached_at: Utc::now(),
        };

        let mut conn = self.client.conn().await?;
        let payload = serde_json::to_string(&stored)?;

        conn.set::<_, _, ()>(clip_key(&clip_id), payload).await?;
        conn.zadd::<_, _, _, ()>(
            collection_clips_key(user_id, collection_id),
            clip_id.as_str(),
            stored.attached_at.timestamp_millis(),
        )
        .await?;

        info!(
            user_id = %user_id,
            collection_id = %collection_id,
            job_id = %job_id,
            clip_id = %clip_id,
            "Attached clip to collection"
        );
        Ok(clip_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_models::{Platform, ScriptComponents};

    fn sample_result() -> ClipResult {
        ClipResult {
            platform: Platform::Instagram,
            title: "reel".into(),
            transcript: "words".into(),
            components: ScriptComponents::default(),
            degraded: false,
            source_url: "https://www.instagram.com/reel/abc/".into(),
            strategy: "yt-dlp".into(),
        }
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn attach_requires_provisioned_collection() {
        dotenvy::dotenv().ok();
        let sink = RedisCollectionSink::new(StoreClient::from_env().expect("client"));
        let user = format!("sink_test_{}", uuid::Uuid::new_v4());

        assert!(!sink.check_access(&user, "col_1").await.expect("check"));

        sink.create_collection(&user, "col_1").await.expect("create");
        assert!(sink.check_access(&user, "col_1").await.expect("check"));

        let clip_id = sink
            .attach(&user, "col_1", &JobId::new(), &sample_result())
            .await
            .expect("attach");
        assert!(!clip_id.as_str().is_empty());
    }
}
