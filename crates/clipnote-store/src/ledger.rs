//! Append-only credit ledger with atomic period usage counters.
//!
//! Usage is an INCRBY counter per `(user, period)`; the ledger itself is an
//! append-only list per user. Balance is always derived as
//! `plan limit − usage(period)`, never stored.

use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info};

use clipnote_models::{
    period_key, CreditLedgerEntry, CreditOperation, JobId, PlanTier,
};

use crate::client::StoreClient;
use crate::error::StoreResult;

/// Usage counters outlive their period by this many seconds before Redis
/// expires them (covers the longest period plus slack for history reads).
const USAGE_TTL_SECS: i64 = 40 * 24 * 3600;

/// Ledger history retained per user.
const LEDGER_HISTORY_CAP: isize = 1000;

fn usage_key(user_id: &str, period: &str) -> String {
    format!("clipnote:credits:usage:{}:{}", user_id, period)
}

fn ledger_key(user_id: &str) -> String {
    format!("clipnote:credits:ledger:{}", user_id)
}

/// Repository for credit charges, refunds, and history.
#[derive(Clone)]
pub struct CreditLedger {
    client: StoreClient,
}

impl CreditLedger {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Credits consumed by `user_id` in the current period for `tier`.
    pub async fn usage(&self, user_id: &str, tier: PlanTier) -> StoreResult<i64> {
        let mut conn = self.client.conn().await?;
        let period = period_key(tier.credit_period(), Utc::now());
        let used: Option<i64> = conn.get(usage_key(user_id, &period)).await?;
        Ok(used.unwrap_or(0))
    }

    /// Remaining credits in the current period.
    pub async fn remaining(&self, user_id: &str, tier: PlanTier) -> StoreResult<i64> {
        let used = self.usage(user_id, tier).await?;
        Ok((tier.credit_limit() as i64 - used).max(0))
    }

    /// Atomically charge the operation's cost and append a debit entry.
    pub async fn charge(
        &self,
        user_id: &str,
        operation: CreditOperation,
        tier: PlanTier,
        job_id: &JobId,
    ) -> StoreResult<CreditLedgerEntry> {
        let amount = operation.cost() as i64;
        let period = period_key(tier.credit_period(), Utc::now());
        let mut conn = self.client.conn().await?;

        let key = usage_key(user_id, &period);
        let after: i64 = conn.incr(&key, amount).await?;
        conn.expire::<_, ()>(&key, USAGE_TTL_SECS).await?;

        let entry = CreditLedgerEntry::new(
            user_id,
            operation,
            amount,
            after - amount,
            job_id.as_str(),
            format!("{} charge", operation),
        );
        self.append(&entry).await?;

        info!(
            user_id = %user_id,
            job_id = %job_id,
            credits = amount,
            total_used = after,
            "Charged credits"
        );
        Ok(entry)
    }

    /// Atomically credit back `amount` and append a refund entry.
    pub async fn refund(
        &self,
        user_id: &str,
        amount: u32,
        reason: &str,
        tier: PlanTier,
        job_id: &JobId,
    ) -> StoreResult<CreditLedgerEntry> {
        let delta = amount as i64;
        let period = period_key(tier.credit_period(), Utc::now());
        let mut conn = self.client.conn().await?;

        let key = usage_key(user_id, &period);
        let after: i64 = conn.decr(&key, delta).await?;
        conn.expire::<_, ()>(&key, USAGE_TTL_SECS).await?;

        let entry = CreditLedgerEntry::new(
            user_id,
            CreditOperation::Refund,
            -delta,
            after + delta,
            job_id.as_str(),
            reason,
        );
        self.append(&entry).await?;

        info!(
            user_id = %user_id,
            job_id = %job_id,
            credits = amount,
            reason = reason,
            "Refunded credits"
        );
        Ok(entry)
    }

    /// Append an entry to the user's ledger list (never mutated, only
    /// appended; the cap trims only the oldest history).
    async fn append(&self, entry: &CreditLedgerEntry) -> StoreResult<()> {
        let mut conn = self.client.conn().await?;
        let payload = serde_json::to_string(entry)?;
        let key = ledger_key(&entry.user_id);

        conn.rpush::<_, _, ()>(&key, payload).await?;
        conn.ltrim::<_, ()>(&key, -LEDGER_HISTORY_CAP, -1).await?;

        debug!(user_id = %entry.user_id, entry_id = %entry.id, "Appended ledger entry");
        Ok(())
    }

    /// Most recent ledger entries, newest last.
    pub async fn history(&self, user_id: &str, limit: usize) -> StoreResult<Vec<CreditLedgerEntry>> {
        let mut conn = self.client.conn().await?;
        let payloads: Vec<String> = conn
            .lrange(ledger_key(user_id), -(limit.max(1) as isize), -1)
            .await?;

        let mut entries = Vec::with_capacity(payloads.len());
        for p in payloads {
            entries.push(serde_json::from_str(&p)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn charge_then_refund_restores_balance() {
        dotenvy::dotenv().ok();
        let ledger = CreditLedger::new(StoreClient::from_env().expect("client"));
        let user = format!("ledger_test_{}", uuid::Uuid::new_v4());
        let job_id = JobId::new();

        let before = ledger.usage(&user, PlanTier::Creator).await.expect("usage");

        let debit = ledger
            .charge(&user, CreditOperation::Transcription, PlanTier::Creator, &job_id)
            .await
            .expect("charge");
        assert_eq!(debit.balance_after, debit.balance_before + debit.amount);
        assert!(debit.is_debit());

        let refund = ledger
            .refund(&user, 1, "attach failed", PlanTier::Creator, &job_id)
            .await
            .expect("refund");
        assert_eq!(refund.balance_after, refund.balance_before + refund.amount);

        let after = ledger.usage(&user, PlanTier::Creator).await.expect("usage");
        assert_eq!(after, before);

        // Exactly one debit and one refund correlated to this job
        let history = ledger.history(&user, 10).await.expect("history");
        let for_job: Vec<_> = history
            .iter()
            .filter(|e| e.job_id == job_id.as_str())
            .collect();
        assert_eq!(for_job.len(), 2);
        assert_eq!(for_job.iter().filter(|e| e.is_debit()).count(), 1);
    }
}
