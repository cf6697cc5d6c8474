//! Per-user rate-limit window persistence.
//!
//! Fixed windows stored as INCR counters keyed by `(user, kind, bucket)`.
//! The increment is the atomic admission point; concurrent checks for the
//! same user race only on INCR, which Redis serializes.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use redis::AsyncCommands;

use clipnote_models::{RateLimitKind, RateWindow};

use crate::client::StoreClient;
use crate::error::StoreResult;

/// Outcome of one rate check.
#[derive(Debug, Clone)]
pub struct RateCheck {
    /// Whether the request fits the window allowance
    pub allowed: bool,
    /// Requests counted in the current window, including this one
    pub count: u32,
    /// Wait until the window resets (zero when allowed)
    pub retry_after: Duration,
}

/// Store for per-user fixed rate windows.
#[derive(Clone)]
pub struct RateLimitStore {
    client: StoreClient,
}

impl RateLimitStore {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Count one request against the user's window for `kind` and report
    /// whether it fits under `max`.
    ///
    /// Denied requests still count; the expiry is set only on the first
    /// increment, so denials never extend the window.
    pub async fn check_and_count(
        &self,
        user_id: &str,
        kind: RateLimitKind,
        max: u32,
    ) -> StoreResult<RateCheck> {
        let now = Utc::now();
        let window_secs = kind.window().num_seconds();
        let bucket = now.timestamp() / window_secs;
        let key = format!("clipnote:rate:{}:{}:{}", user_id, kind.as_str(), bucket);

        let mut conn = self.client.conn().await?;
        let count: u32 = conn.incr(&key, 1).await?;
        if count == 1 {
            // Keep the bucket a little past its window for observability
            conn.expire::<_, ()>(&key, window_secs * 2).await?;
        }

        // Reconstruct the window from the bucket; the pure model decides
        let window = RateWindow {
            window_start: Utc
                .timestamp_opt(bucket * window_secs, 0)
                .single()
                .unwrap_or(now),
            duration: kind.window(),
            count,
            max,
        };

        let allowed = !window.exhausted(now);
        let retry_after = if allowed {
            Duration::ZERO
        } else {
            Duration::from_secs(window.retry_after(now).num_seconds().max(1) as u64)
        };

        Ok(RateCheck {
            allowed,
            count,
            retry_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn burst_window_denies_with_retry_after() {
        dotenvy::dotenv().ok();
        let store = RateLimitStore::new(StoreClient::from_env().expect("client"));
        let user = format!("rate_test_{}", uuid::Uuid::new_v4());

        let first = store
            .check_and_count(&user, RateLimitKind::Burst, 1)
            .await
            .expect("check");
        assert!(first.allowed);
        assert_eq!(first.count, 1);

        // Requests 2..=10 are all denied with a positive wait
        for _ in 0..9 {
            let denied = store
                .check_and_count(&user, RateLimitKind::Burst, 1)
                .await
                .expect("check");
            assert!(!denied.allowed);
            assert!(denied.retry_after > Duration::ZERO);
        }
    }
}
