//! Credit ledger data models and plan configuration.
//!
//! Each credit-consuming operation maps to a fixed cost. Charges and refunds
//! are recorded as append-only ledger entries; a user's remaining balance is
//! derived as `plan limit − usage since period start`, never stored directly.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Credits charged for one transcription job.
pub const TRANSCRIPTION_CREDIT_COST: u32 = 1;

/// Type of credit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditOperation {
    /// Queued transcription of a submitted clip
    Transcription,
    /// Synchronous direct-path transcription (queue fallback)
    DirectTranscription,
    /// Compensating refund after a post-charge failure
    Refund,
}

impl CreditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::DirectTranscription => "direct_transcription",
            Self::Refund => "refund",
        }
    }

    /// Fixed credit cost of this operation. Refunds have no cost of their
    /// own; the refunded amount comes from the original charge.
    pub fn cost(&self) -> u32 {
        match self {
            Self::Transcription | Self::DirectTranscription => TRANSCRIPTION_CREDIT_COST,
            Self::Refund => 0,
        }
    }
}

impl fmt::Display for CreditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing period granularity for a plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditPeriod {
    /// Resets at midnight UTC
    Daily,
    /// Resets on the first of the month UTC
    Monthly,
}

/// Key identifying the current billing period ("YYYY-MM-DD" daily,
/// "YYYY-MM" monthly). Usage counters and ledger partitions are keyed by it,
/// so each tier resets on its own boundary.
pub fn period_key(period: CreditPeriod, now: DateTime<Utc>) -> String {
    match period {
        CreditPeriod::Daily => format!("{:04}-{:02}-{:02}", now.year(), now.month(), now.day()),
        CreditPeriod::Monthly => format!("{:04}-{:02}", now.year(), now.month()),
    }
}

/// Plan tier enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Creator,
    Studio,
}

impl PlanTier {
    /// Parse from string (case-insensitive, unknown values fall back to free).
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "creator" => PlanTier::Creator,
            "studio" => PlanTier::Studio,
            _ => PlanTier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Creator => "creator",
            PlanTier::Studio => "studio",
        }
    }

    /// Credit limit per billing period.
    pub fn credit_limit(&self) -> u32 {
        match self {
            PlanTier::Free => 5,
            PlanTier::Creator => 300,
            PlanTier::Studio => 1500,
        }
    }

    /// Free-tier credits reset daily; paid tiers monthly.
    pub fn credit_period(&self) -> CreditPeriod {
        match self {
            PlanTier::Free => CreditPeriod::Daily,
            PlanTier::Creator | PlanTier::Studio => CreditPeriod::Monthly,
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An append-only credit transaction.
///
/// Debits carry a positive amount, refunds a negative one. The constructor
/// derives `balance_after` so that `balance_after == balance_before + amount`
/// holds for every entry ever written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    /// Unique identifier for this entry (UUID)
    pub id: String,

    /// User whose balance this entry affects
    pub user_id: String,

    /// Operation kind
    pub operation: CreditOperation,

    /// Signed credit delta (debit > 0, refund < 0)
    pub amount: i64,

    /// Period usage before this entry
    pub balance_before: i64,

    /// Period usage after this entry
    pub balance_after: i64,

    /// Correlated job
    pub job_id: String,

    /// Human-readable reason
    pub reason: String,

    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
}

impl CreditLedgerEntry {
    /// Create a new ledger entry. `balance_before` is the period usage
    /// observed at append time.
    pub fn new(
        user_id: impl Into<String>,
        operation: CreditOperation,
        amount: i64,
        balance_before: i64,
        job_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            operation,
            amount,
            balance_before,
            balance_after: balance_before + amount,
            job_id: job_id.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether this entry is a debit (consumes credits).
    pub fn is_debit(&self) -> bool {
        self.amount > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ledger_entry_balance_invariant() {
        let debit = CreditLedgerEntry::new("u1", CreditOperation::Transcription, 1, 4, "j1", "charge");
        assert_eq!(debit.balance_after, debit.balance_before + debit.amount);
        assert!(debit.is_debit());

        let refund = CreditLedgerEntry::new("u1", CreditOperation::Refund, -1, 5, "j1", "attach failed");
        assert_eq!(refund.balance_after, 4);
        assert!(!refund.is_debit());
    }

    #[test]
    fn period_keys_by_tier() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(period_key(CreditPeriod::Daily, now), "2025-03-07");
        assert_eq!(period_key(CreditPeriod::Monthly, now), "2025-03");
    }

    #[test]
    fn tier_periods_and_limits() {
        assert_eq!(PlanTier::Free.credit_period(), CreditPeriod::Daily);
        assert_eq!(PlanTier::Creator.credit_period(), CreditPeriod::Monthly);
        assert!(PlanTier::Studio.credit_limit() > PlanTier::Creator.credit_limit());
    }

    #[test]
    fn tier_parse_is_lenient() {
        assert_eq!(PlanTier::parse("Creator"), PlanTier::Creator);
        assert_eq!(PlanTier::parse("STUDIO"), PlanTier::Studio);
        assert_eq!(PlanTier::parse("unknown"), PlanTier::Free);
    }

    #[test]
    fn operation_costs() {
        assert_eq!(CreditOperation::Transcription.cost(), TRANSCRIPTION_CREDIT_COST);
        assert_eq!(CreditOperation::Refund.cost(), 0);
    }
}
