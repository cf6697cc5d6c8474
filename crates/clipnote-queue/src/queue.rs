//! Job queue using Redis Streams.

use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use clipnote_models::Priority;

use crate::error::{QueueError, QueueResult};
use crate::job::TranscribeClipJob;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for high-priority jobs
    pub stream_high: String,
    /// Stream name for normal-priority jobs
    pub stream_normal: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream: String,
    /// Sorted set holding backoff-delayed jobs
    pub delayed_set: String,
    /// Dedup key TTL
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_high: "clipnote:jobs:high".to_string(),
            stream_normal: "clipnote:jobs:normal".to_string(),
            consumer_group: "clipnote:workers".to_string(),
            dlq_stream: "clipnote:dlq".to_string(),
            delayed_set: "clipnote:jobs:delayed".to_string(),
            dedup_ttl: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_high: std::env::var("QUEUE_STREAM_HIGH").unwrap_or(defaults.stream_high),
            stream_normal: std::env::var("QUEUE_STREAM_NORMAL").unwrap_or(defaults.stream_normal),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            dlq_stream: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream),
            delayed_set: std::env::var("QUEUE_DELAYED_SET").unwrap_or(defaults.delayed_set),
            dedup_ttl: Duration::from_secs(
                std::env::var("QUEUE_DEDUP_TTL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

/// A job consumed from the queue, with the coordinates needed to ack it.
#[derive(Debug, Clone)]
pub struct ConsumedJob {
    /// Stream the message came from
    pub stream: String,
    /// Stream message ID
    pub message_id: String,
    /// The job payload
    pub job: TranscribeClipJob,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    fn stream_for(&self, priority: Priority) -> &str {
        match priority {
            Priority::High => &self.config.stream_high,
            Priority::Normal => &self.config.stream_normal,
        }
    }

    /// Initialize the queue (create consumer groups if not present).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for stream in [&self.config.stream_high, &self.config.stream_normal] {
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(stream)
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group on {}", stream),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists on {}", stream);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Enqueue a job onto its priority stream.
    ///
    /// Rejects duplicates via the job's idempotency key.
    pub async fn enqueue(&self, job: &TranscribeClipJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let idempotency_key = job.idempotency_key();
        let dedup_key = format!("clipnote:dedup:{}", idempotency_key);
        let created: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        if !created {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let payload = serde_json::to_string(job)?;
        let stream = self.stream_for(job.priority);

        let message_id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        info!(
            job_id = %job.job_id,
            stream = stream,
            message_id = %message_id,
            "Enqueued job"
        );

        Ok(message_id)
    }

    /// Consume jobs, draining the high-priority stream before the normal one.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<ConsumedJob>> {
        // High priority first, without blocking
        let mut jobs = self
            .read_stream(&self.config.stream_high, consumer_name, 0, count)
            .await?;

        if jobs.len() < count {
            let remaining = count - jobs.len();
            // Only block once the high stream is drained
            let block = if jobs.is_empty() { block_ms } else { 0 };
            let normal = self
                .read_stream(&self.config.stream_normal, consumer_name, block, remaining)
                .await?;
            jobs.extend(normal);
        }

        Ok(jobs)
    }

    async fn read_stream(
        &self,
        stream: &str,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<ConsumedJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<TranscribeClipJob>(&payload_str) {
                        Ok(job) => {
                            debug!(job_id = %job.job_id, stream = stream, "Consumed job");
                            jobs.push(ConsumedJob {
                                stream: stream.to_string(),
                                message_id,
                                job,
                            });
                        }
                        Err(e) => {
                            warn!("Failed to parse job payload: {}", e);
                            // Ack the malformed message to prevent reprocessing
                            self.ack(stream, &message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Acknowledge a job (mark as completed) and delete it from the stream.
    pub async fn ack(&self, stream: &str, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job message: {}", message_id);
        Ok(())
    }

    /// Schedule a job for re-enqueue after a backoff delay.
    ///
    /// The job is parked on a sorted set scored by its ready time; the pump
    /// task moves due entries back onto their priority stream.
    pub async fn schedule_retry(&self, job: &TranscribeClipJob, delay: Duration) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let payload = serde_json::to_string(job)?;

        conn.zadd::<_, _, _, ()>(&self.config.delayed_set, payload, ready_at)
            .await?;

        info!(
            job_id = %job.job_id,
            delay_secs = delay.as_secs(),
            "Scheduled job for delayed retry"
        );
        Ok(())
    }

    /// Move due delayed jobs back onto their priority streams.
    ///
    /// Returns the number of jobs re-enqueued.
    pub async fn pump_delayed(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let now = Utc::now().timestamp_millis();
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.config.delayed_set)
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(64)
            .query_async(&mut conn)
            .await?;

        let mut moved = 0;
        for payload in due {
            // Remove first; only the remover re-enqueues, so concurrent pumps
            // cannot double-deliver.
            let removed: i64 = conn.zrem(&self.config.delayed_set, &payload).await?;
            if removed == 0 {
                continue;
            }

            match serde_json::from_str::<TranscribeClipJob>(&payload) {
                Ok(job) => {
                    let stream = self.stream_for(job.priority);
                    redis::cmd("XADD")
                        .arg(stream)
                        .arg("*")
                        .arg("job")
                        .arg(&payload)
                        .arg("key")
                        .arg(job.idempotency_key())
                        .query_async::<String>(&mut conn)
                        .await?;
                    debug!(job_id = %job.job_id, "Re-enqueued delayed job");
                    moved += 1;
                }
                Err(e) => {
                    warn!("Dropping unparseable delayed job: {}", e);
                }
            }
        }

        Ok(moved)
    }

    /// Move a job to the dead letter queue and ack the original message.
    pub async fn dlq(
        &self,
        stream: &str,
        message_id: &str,
        job: &TranscribeClipJob,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<String>(&mut conn)
            .await?;

        self.ack(stream, message_id).await?;

        warn!(job_id = %job.job_id, "Moved job to DLQ: {}", error);
        Ok(())
    }

    /// Clear the dedup key so the same submission can be re-enqueued.
    pub async fn clear_dedup(&self, job: &TranscribeClipJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let dedup_key = format!("clipnote:dedup:{}", job.idempotency_key());
        conn.del::<_, ()>(&dedup_key).await?;
        Ok(())
    }

    /// Pending depth of both priority streams (high, normal).
    pub async fn len(&self) -> QueueResult<(u64, u64)> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let high: u64 = conn.xlen(&self.config.stream_high).await?;
        let normal: u64 = conn.xlen(&self.config.stream_normal).await?;
        Ok((high, normal))
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream).await?;
        Ok(len)
    }

    /// Approximate queue position for a newly enqueued job.
    pub async fn queue_position(&self, priority: Priority) -> QueueResult<u64> {
        let (high, normal) = self.len().await?;
        Ok(match priority {
            Priority::High => high,
            Priority::Normal => high + normal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_models::{JobId, Platform};

    #[test]
    fn config_defaults_are_sane() {
        let config = QueueConfig::default();
        assert_ne!(config.stream_high, config.stream_normal);
        assert_eq!(config.dedup_ttl, Duration::from_secs(3600));
    }

    fn sample_job(priority: Priority) -> TranscribeClipJob {
        TranscribeClipJob::new(
            JobId::new(),
            "test_user",
            "col_1",
            "https://www.tiktok.com/@a/video/1",
            Platform::Tiktok,
        )
        .with_priority(priority)
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn enqueue_consume_ack_cycle() {
        dotenvy::dotenv().ok();
        let queue = JobQueue::from_env().expect("create queue");
        queue.init().await.expect("init queue");

        let job = sample_job(Priority::Normal);
        let job_id = job.job_id.clone();
        queue.enqueue(&job).await.expect("enqueue");

        let consumed = queue.consume("test-consumer", 1000, 1).await.expect("consume");
        assert_eq!(consumed.len(), 1);
        assert_eq!(consumed[0].job.job_id, job_id);

        queue
            .ack(&consumed[0].stream, &consumed[0].message_id)
            .await
            .expect("ack");
        queue.clear_dedup(&job).await.expect("clear dedup");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn duplicate_enqueue_is_rejected() {
        dotenvy::dotenv().ok();
        let queue = JobQueue::from_env().expect("create queue");
        queue.init().await.expect("init queue");

        let job = sample_job(Priority::Normal);
        queue.enqueue(&job).await.expect("first enqueue");
        let err = queue.enqueue(&job).await.expect_err("duplicate rejected");
        assert!(matches!(err, QueueError::Duplicate(_)));

        queue.clear_dedup(&job).await.expect("clear dedup");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn high_priority_consumed_first() {
        dotenvy::dotenv().ok();
        let queue = JobQueue::from_env().expect("create queue");
        queue.init().await.expect("init queue");

        let normal = sample_job(Priority::Normal);
        let high = sample_job(Priority::High);
        queue.enqueue(&normal).await.expect("enqueue normal");
        queue.enqueue(&high).await.expect("enqueue high");

        let consumed = queue.consume("test-consumer", 1000, 1).await.expect("consume");
        assert_eq!(consumed[0].job.job_id, high.job_id);

        for c in queue.consume("test-consumer", 1000, 10).await.expect("drain") {
            queue.ack(&c.stream, &c.message_id).await.ok();
        }
        queue.ack(&consumed[0].stream, &consumed[0].message_id).await.ok();
        queue.clear_dedup(&normal).await.ok();
        queue.clear_dedup(&high).await.ok();
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn delayed_jobs_pump_back_when_due() {
        dotenvy::dotenv().ok();
        let queue = JobQueue::from_env().expect("create queue");
        queue.init().await.expect("init queue");

        let job = sample_job(Priority::Normal);
        queue
            .schedule_retry(&job, Duration::from_millis(0))
            .await
            .expect("schedule");

        let moved = queue.pump_delayed().await.expect("pump");
        assert!(moved >= 1);

        for c in queue.consume("test-consumer", 1000, 10).await.expect("drain") {
            queue.ack(&c.stream, &c.message_id).await.ok();
        }
    }
}
