//! The admission gate: rate windows + credit balance, checked together.
//!
//! A reservation decides whether a job may be admitted; nothing is deducted
//! until the job's outcome is known (`commit` on success, `refund` to
//! compensate a post-commit failure). Gate-infrastructure errors are soft:
//! processing continues ungated, with the degradation logged.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use clipnote_models::{
    CreditLedgerEntry, CreditOperation, ErrorCode, JobId, PlanTier, RateLimitKind,
};

use crate::client::StoreClient;
use crate::error::StoreResult;
use crate::ledger::CreditLedger;
use crate::rate::RateLimitStore;

/// Per-window request allowances.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Requests per burst (one-minute) window
    pub burst_max: u32,
    /// Requests per sustained (one-hour) window
    pub sustained_max: u32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            burst_max: RateLimitKind::Burst.default_max(),
            sustained_max: RateLimitKind::Sustained.default_max(),
        }
    }
}

impl AdmissionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            burst_max: std::env::var("RATE_BURST_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.burst_max),
            sustained_max: std::env::var("RATE_SUSTAINED_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sustained_max),
        }
    }
}

/// Result of a reservation.
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    /// Whether the job may proceed
    pub allowed: bool,
    /// Credits remaining in the current period (after the pending charge
    /// would apply; not yet deducted)
    pub credits_remaining: i64,
    /// For rate denials, the longest wait among exhausted windows
    pub retry_after: Option<Duration>,
    /// Denial classification and human-readable reason
    pub denial: Option<(ErrorCode, String)>,
    /// Set when the gate store was unreachable and the request was admitted
    /// ungated
    pub degraded: bool,
}

impl AdmissionDecision {
    fn allowed(credits_remaining: i64) -> Self {
        Self {
            allowed: true,
            credits_remaining,
            retry_after: None,
            denial: None,
            degraded: false,
        }
    }

    fn denied(code: ErrorCode, reason: String, retry_after: Option<Duration>) -> Self {
        Self {
            allowed: false,
            credits_remaining: 0,
            retry_after,
            denial: Some((code, reason)),
            degraded: false,
        }
    }

    fn degraded() -> Self {
        Self {
            allowed: true,
            credits_remaining: 0,
            retry_after: None,
            denial: None,
            degraded: true,
        }
    }
}

/// Admission capability consumed by the API and the worker.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    /// Decide whether a job for `user_id` may be admitted. Does not deduct.
    async fn reserve(
        &self,
        user_id: &str,
        operation: CreditOperation,
        tier: PlanTier,
    ) -> AdmissionDecision;

    /// Charge the operation's cost. At-most-once per job: callers serialize
    /// this through the job's terminal-state transition.
    async fn commit(
        &self,
        user_id: &str,
        operation: CreditOperation,
        tier: PlanTier,
        job_id: &JobId,
    ) -> StoreResult<CreditLedgerEntry>;

    /// Compensating refund after a failure that followed a commit.
    async fn refund(
        &self,
        user_id: &str,
        amount: u32,
        reason: &str,
        tier: PlanTier,
        job_id: &JobId,
    ) -> StoreResult<CreditLedgerEntry>;
}

/// Production gate composing the rate store and the credit ledger.
#[derive(Clone)]
pub struct AdmissionGate {
    rates: RateLimitStore,
    ledger: CreditLedger,
    config: AdmissionConfig,
}

impl AdmissionGate {
    pub fn new(client: StoreClient, config: AdmissionConfig) -> Self {
        Self {
            rates: RateLimitStore::new(client.clone()),
            ledger: CreditLedger::new(client),
            config,
        }
    }

    /// Direct access to the underlying ledger (balance and history reads).
    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }
}

#[async_trait]
impl AdmissionControl for AdmissionGate {
    async fn reserve(
        &self,
        user_id: &str,
        operation: CreditOperation,
        tier: PlanTier,
    ) -> AdmissionDecision {
        // Rate windows first: evaluate every configured kind and report the
        // longest remaining wait when any is exhausted.
        let checks = [
            (RateLimitKind::Burst, self.config.burst_max),
            (RateLimitKind::Sustained, self.config.sustained_max),
        ];

        let mut longest_wait: Option<Duration> = None;
        for (kind, max) in checks {
            match self.rates.check_and_count(user_id, kind, max).await {
                Ok(check) if !check.allowed => {
                    if longest_wait.map_or(true, |w| check.retry_after > w) {
                        longest_wait = Some(check.retry_after);
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_unavailable() => {
                    warn!(
                        user_id = %user_id,
                        error = %e,
                        "Rate store unavailable, admitting ungated"
                    );
                    return AdmissionDecision::degraded();
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Rate check failed, admitting ungated");
                    return AdmissionDecision::degraded();
                }
            }
        }

        if let Some(wait) = longest_wait {
            return AdmissionDecision::denied(
                ErrorCode::RateLimited,
                format!(
                    "Rate limit exceeded. Try again in {} seconds.",
                    wait.as_secs()
                ),
                Some(wait),
            );
        }

        // Credit balance for the current period
        let remaining = match self.ledger.remaining(user_id, tier).await {
            Ok(r) => r,
            Err(e) if e.is_unavailable() => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Credit ledger unavailable, admitting ungated"
                );
                return AdmissionDecision::degraded();
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Balance read failed, admitting ungated");
                return AdmissionDecision::degraded();
            }
        };

        let cost = operation.cost() as i64;
        if cost > remaining {
            return AdmissionDecision::denied(
                ErrorCode::InsufficientCredits,
                format!(
                    "Insufficient credits. You need {} but have {} remaining of your {} {} limit. \
                     Please upgrade your plan.",
                    cost,
                    remaining,
                    tier.credit_limit(),
                    tier.as_str()
                ),
                None,
            );
        }

        AdmissionDecision::allowed(remaining - cost)
    }

    async fn commit(
        &self,
        user_id: &str,
        operation: CreditOperation,
        tier: PlanTier,
        job_id: &JobId,
    ) -> StoreResult<CreditLedgerEntry> {
        self.ledger.charge(user_id, operation, tier, job_id).await
    }

    async fn refund(
        &self,
        user_id: &str,
        amount: u32,
        reason: &str,
        tier: PlanTier,
        job_id: &JobId,
    ) -> StoreResult<CreditLedgerEntry> {
        self.ledger
            .refund(user_id, amount, reason, tier, job_id)
            .await
    }
}
