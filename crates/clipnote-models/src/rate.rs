//! Fixed-window rate limiting primitives.
//!
//! The window math lives here, pure and clock-injected, so the reset
//! boundary is testable without a store. Persistence (atomic per-user
//! counters) lives in the store crate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Configured limit kinds evaluated by the admission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
    /// Short-window burst protection
    Burst,
    /// Longer-window sustained-rate protection
    Sustained,
}

impl RateLimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitKind::Burst => "burst",
            RateLimitKind::Sustained => "sustained",
        }
    }

    /// Window duration for this kind.
    pub fn window(&self) -> Duration {
        match self {
            RateLimitKind::Burst => Duration::seconds(60),
            RateLimitKind::Sustained => Duration::seconds(3600),
        }
    }

    /// Default request allowance per window.
    pub fn default_max(&self) -> u32 {
        match self {
            RateLimitKind::Burst => 10,
            RateLimitKind::Sustained => 60,
        }
    }
}

/// One per-user, per-kind counter bucket.
///
/// Windows reset exactly when `now >= window_start + duration` and are never
/// partially decremented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateWindow {
    pub window_start: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub count: u32,
    pub max: u32,
}

impl RateWindow {
    pub fn new(kind: RateLimitKind, max: u32, now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            duration: kind.window(),
            count: 0,
            max,
        }
    }

    /// Whether the window has elapsed at `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.window_start + self.duration
    }

    /// Record one request. Resets the bucket first if the window elapsed.
    /// Returns the count after the increment.
    pub fn increment(&mut self, now: DateTime<Utc>) -> u32 {
        if self.expired(now) {
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;
        self.count
    }

    /// Whether the bucket is over its allowance.
    pub fn exhausted(&self, now: DateTime<Utc>) -> bool {
        !self.expired(now) && self.count > self.max
    }

    /// Remaining wait until the window resets. Zero once expired.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let end = self.window_start + self.duration;
        if now >= end {
            Duration::zero()
        } else {
            end - now
        }
    }
}

mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(d)?;
        Ok(Duration::seconds(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn window_denies_over_allowance() {
        let now = t0();
        let mut window = RateWindow::new(RateLimitKind::Burst, 1, now);

        assert_eq!(window.increment(now), 1);
        assert!(!window.exhausted(now));

        // Requests 2..=10 within the same window are all over the allowance
        for _ in 0..9 {
            window.increment(now + Duration::seconds(1));
        }
        assert!(window.exhausted(now + Duration::seconds(1)));
        assert!(window.retry_after(now + Duration::seconds(1)) > Duration::zero());
    }

    #[test]
    fn window_resets_exactly_at_boundary() {
        let now = t0();
        let mut window = RateWindow::new(RateLimitKind::Burst, 1, now);
        window.increment(now);
        window.increment(now);
        assert!(window.exhausted(now));

        // One tick before the boundary: still exhausted
        let just_before = now + Duration::seconds(59);
        assert!(!window.expired(just_before));
        assert!(window.exhausted(just_before));

        // Exactly at the boundary: admitted again
        let boundary = now + Duration::seconds(60);
        assert!(window.expired(boundary));
        assert!(!window.exhausted(boundary));
        assert_eq!(window.increment(boundary), 1);
    }

    #[test]
    fn retry_after_counts_down_to_zero() {
        let now = t0();
        let window = RateWindow::new(RateLimitKind::Burst, 1, now);

        assert_eq!(window.retry_after(now), Duration::seconds(60));
        assert_eq!(
            window.retry_after(now + Duration::seconds(45)),
            Duration::seconds(15)
        );
        assert_eq!(
            window.retry_after(now + Duration::seconds(60)),
            Duration::zero()
        );
    }

    #[test]
    fn kinds_have_distinct_windows() {
        assert!(RateLimitKind::Sustained.window() > RateLimitKind::Burst.window());
    }
}
