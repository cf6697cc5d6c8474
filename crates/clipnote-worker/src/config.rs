//! Worker configuration.

use std::time::Duration;

use crate::transcriber::MalformedResponsePolicy;

/// Worker runtime configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs processed concurrently
    pub max_concurrent_jobs: usize,
    /// Base delay for retry backoff (doubles each attempt)
    pub backoff_base: Duration,
    /// Cap on the retry backoff delay
    pub backoff_cap: Duration,
    /// Deadline for the acquire stage (whole chain)
    pub acquire_timeout: Duration,
    /// Deadline for the transcribe stage
    pub transcribe_timeout: Duration,
    /// Deadline for the attach stage
    pub attach_timeout: Duration,
    /// How to handle malformed transcription responses after one repair
    pub malformed_policy: MalformedResponsePolicy,
    /// Block duration for queue reads
    pub consume_block_ms: u64,
    /// Interval for pumping delayed jobs back onto the streams
    pub pump_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(90),
            transcribe_timeout: Duration::from_secs(120),
            attach_timeout: Duration::from_secs(15),
            malformed_policy: MalformedResponsePolicy::Placeholder,
            consume_block_ms: 1000,
            pump_interval: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_jobs),
            backoff_base: secs("WORKER_BACKOFF_BASE_SECS", defaults.backoff_base),
            backoff_cap: secs("WORKER_BACKOFF_CAP_SECS", defaults.backoff_cap),
            acquire_timeout: secs("WORKER_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout),
            transcribe_timeout: secs("WORKER_TRANSCRIBE_TIMEOUT_SECS", defaults.transcribe_timeout),
            attach_timeout: secs("WORKER_ATTACH_TIMEOUT_SECS", defaults.attach_timeout),
            malformed_policy: std::env::var("WORKER_MALFORMED_POLICY")
                .map(|s| MalformedResponsePolicy::parse(&s))
                .unwrap_or(defaults.malformed_policy),
            consume_block_ms: std::env::var("WORKER_CONSUME_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.consume_block_ms),
            pump_interval: secs("WORKER_PUMP_INTERVAL_SECS", defaults.pump_interval),
        }
    }

    /// Backoff delay for the given attempt number (1-based), capped.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.backoff_cap)
    }
}
