//! Job record repository.
//!
//! Records are JSON blobs keyed by job ID, with a per-user index sorted by
//! creation time for `(owner, status)` queries. The Queued → Processing
//! transition is the sole mutual-exclusion point between workers and
//! cancellation; it is guarded by a SET NX claim key.

use redis::AsyncCommands;
use tracing::{debug, info};

use clipnote_models::{JobId, JobRecord, JobStatus};

use crate::client::StoreClient;
use crate::error::{StoreError, StoreResult};

/// Visibility window for a processing claim. A crashed worker's claim
/// expires after this, letting a retry attempt reclaim the job.
const CLAIM_TTL_SECS: u64 = 900;

fn job_key(id: &JobId) -> String {
    format!("clipnote:job:{}", id)
}

fn claim_key(id: &JobId) -> String {
    format!("clipnote:job-claim:{}", id)
}

fn user_index_key(user_id: &str) -> String {
    format!("clipnote:user-jobs:{}", user_id)
}

/// Repository for job lifecycle records.
#[derive(Clone)]
pub struct JobRepository {
    client: StoreClient,
}

impl JobRepository {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Persist a new job record and index it for its owner.
    pub async fn create(&self, record: &JobRecord) -> StoreResult<()> {
        let mut conn = self.client.conn().await?;
        let payload = serde_json::to_string(record)?;

        conn.set::<_, _, ()>(job_key(&record.id), payload).await?;
        conn.zadd::<_, _, _, ()>(
            user_index_key(&record.user_id),
            record.id.as_str(),
            record.created_at.timestamp_millis(),
        )
        .await?;

        debug!(job_id = %record.id, user_id = %record.user_id, "Created job record");
        Ok(())
    }

    /// Fetch a record by ID.
    pub async fn get(&self, id: &JobId) -> StoreResult<Option<JobRecord>> {
        let mut conn = self.client.conn().await?;
        let payload: Option<String> = conn.get(job_key(id)).await?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    /// Fetch a record owned by `user_id`. A job owned by someone else is
    /// indistinguishable from a missing one.
    pub async fn get_owned(&self, id: &JobId, user_id: &str) -> StoreResult<Option<JobRecord>> {
        Ok(self
            .get(id)
            .await?
            .filter(|record| record.user_id == user_id))
    }

    /// Overwrite an existing record.
    pub async fn save(&self, record: &JobRecord) -> StoreResult<()> {
        let mut conn = self.client.conn().await?;
        let payload = serde_json::to_string(record)?;
        conn.set::<_, _, ()>(job_key(&record.id), payload).await?;
        Ok(())
    }

    /// Atomically transition a queued job to processing, consuming one
    /// attempt. Returns the updated record, or `None` when the job was not
    /// queued (cancelled, already claimed, or unknown).
    pub async fn claim_for_processing(&self, id: &JobId) -> StoreResult<Option<JobRecord>> {
        let mut conn = self.client.conn().await?;

        let claimed: bool = redis::cmd("SET")
            .arg(claim_key(id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(CLAIM_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        if !claimed {
            debug!(job_id = %id, "Job already claimed by another worker");
            return Ok(None);
        }

        let record = match self.get(id).await? {
            Some(r) => r,
            None => {
                conn.del::<_, ()>(claim_key(id)).await?;
                return Ok(None);
            }
        };

        if record.status != JobStatus::Queued {
            debug!(job_id = %id, status = %record.status, "Job not claimable");
            conn.del::<_, ()>(claim_key(id)).await?;
            return Ok(None);
        }

        let started = record.start_attempt();
        self.save(&started).await?;
        Ok(Some(started))
    }

    /// Release a processing claim once the attempt reaches an outcome.
    pub async fn release_claim(&self, id: &JobId) -> StoreResult<()> {
        let mut conn = self.client.conn().await?;
        conn.del::<_, ()>(claim_key(id)).await?;
        Ok(())
    }

    /// Cancel a still-queued job. Returns the cancelled record, or an error
    /// when the job has already been dispatched.
    pub async fn cancel_if_queued(&self, id: &JobId, user_id: &str) -> StoreResult<JobRecord> {
        let record = self
            .get_owned(id, user_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("job {id}")))?;

        if record.status != JobStatus::Queued {
            return Err(StoreError::conflict(format!(
                "job {} is {} and cannot be cancelled",
                id, record.status
            )));
        }

        let cancelled = record.cancel();
        self.save(&cancelled).await?;
        info!(job_id = %id, "Cancelled queued job");
        Ok(cancelled)
    }

    /// List a user's jobs, newest first, optionally filtered by status.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<JobStatus>,
        limit: usize,
    ) -> StoreResult<Vec<JobRecord>> {
        let mut conn = self.client.conn().await?;

        let ids: Vec<String> = conn
            .zrevrange(user_index_key(user_id), 0, (limit.max(1) - 1) as isize)
            .await?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get(&JobId::from_string(id)).await? {
                if status.map_or(true, |s| record.status == s) {
                    records.push(record);
                }
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_models::{Platform, Priority};

    fn sample_record() -> JobRecord {
        JobRecord::new(
            "store_test_user",
            "col_1",
            "https://www.tiktok.com/@a/video/1",
            None,
            Platform::Tiktok,
            Priority::Normal,
        )
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn create_get_and_ownership_check() {
        dotenvy::dotenv().ok();
        let repo = JobRepository::new(StoreClient::from_env().expect("client"));

        let record = sample_record();
        repo.create(&record).await.expect("create");

        let fetched = repo.get(&record.id).await.expect("get").expect("present");
        assert_eq!(fetched.status, JobStatus::Queued);

        // Foreign owner sees nothing
        let foreign = repo
            .get_owned(&record.id, "someone_else")
            .await
            .expect("get_owned");
        assert!(foreign.is_none());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn claim_is_exclusive_and_consumes_attempt() {
        dotenvy::dotenv().ok();
        let repo = JobRepository::new(StoreClient::from_env().expect("client"));

        let record = sample_record();
        repo.create(&record).await.expect("create");

        let claimed = repo
            .claim_for_processing(&record.id)
            .await
            .expect("claim")
            .expect("claimable");
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.attempt_count, 1);

        // Second claim fails while the first is held
        let second = repo.claim_for_processing(&record.id).await.expect("claim");
        assert!(second.is_none());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn cancel_only_while_queued() {
        dotenvy::dotenv().ok();
        let repo = JobRepository::new(StoreClient::from_env().expect("client"));

        let record = sample_record();
        repo.create(&record).await.expect("create");
        repo.claim_for_processing(&record.id).await.expect("claim");

        let err = repo
            .cancel_if_queued(&record.id, &record.user_id)
            .await
            .expect_err("cannot cancel in-flight job");
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
