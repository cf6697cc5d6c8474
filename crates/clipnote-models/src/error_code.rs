//! Stable error-code taxonomy surfaced at the API boundary.
//!
//! Every user-visible failure maps to one of these codes, with an HTTP
//! status, a retryability classification, and a suggested next action.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable string codes for the failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    // Admission
    RateLimited,
    InsufficientCredits,
    LedgerUnavailable,

    // Validation
    InvalidUrl,
    UnsupportedPlatform,
    MissingField,

    // Acquisition
    ContentUnavailable,
    AcquisitionFailed,

    // Transcription
    TranscriptionUnavailable,
    TranscriptionMalformed,

    // Sink
    AttachFailed,

    // Infrastructure
    QueueUnavailable,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate-limited",
            Self::InsufficientCredits => "insufficient-credits",
            Self::LedgerUnavailable => "ledger-unavailable",
            Self::InvalidUrl => "invalid-url",
            Self::UnsupportedPlatform => "unsupported-platform",
            Self::MissingField => "missing-field",
            Self::ContentUnavailable => "content-unavailable",
            Self::AcquisitionFailed => "acquisition-failed",
            Self::TranscriptionUnavailable => "transcription-unavailable",
            Self::TranscriptionMalformed => "transcription-malformed",
            Self::AttachFailed => "attach-failed",
            Self::QueueUnavailable => "queue-unavailable",
            Self::Internal => "internal",
        }
    }

    /// HTTP status surfaced at the API boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::RateLimited => 429,
            Self::InsufficientCredits => 402,
            Self::InvalidUrl | Self::UnsupportedPlatform | Self::MissingField => 400,
            Self::ContentUnavailable => 404,
            Self::AcquisitionFailed
            | Self::TranscriptionUnavailable
            | Self::QueueUnavailable => 503,
            Self::LedgerUnavailable
            | Self::TranscriptionMalformed
            | Self::AttachFailed
            | Self::Internal => 500,
        }
    }

    /// Whether the queue should retry a job failing with this code.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionFailed | Self::TranscriptionUnavailable | Self::QueueUnavailable
        )
    }

    /// Suggested next action shown alongside the failure.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::RateLimited => "Wait for the indicated delay and try again",
            Self::InsufficientCredits => "Upgrade your plan or wait for your credits to reset",
            Self::LedgerUnavailable => "Try again shortly",
            Self::InvalidUrl => "Check the URL and try again",
            Self::UnsupportedPlatform => "Submit a TikTok, Instagram, or YouTube link",
            Self::MissingField => "Fill in the missing field and resubmit",
            Self::ContentUnavailable => "Try a different URL; this content is private or removed",
            Self::AcquisitionFailed => "Retry later; the source platform did not respond",
            Self::TranscriptionUnavailable => "Retry later; the transcription service is busy",
            Self::TranscriptionMalformed => "Retry the job; if it persists, contact support",
            Self::AttachFailed => "Your credits were refunded; retry the job",
            Self::QueueUnavailable => "The request was processed directly; no action needed",
            Self::Internal => "Retry later; if it persists, contact support",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_kebab_case() {
        let json = serde_json::to_string(&ErrorCode::ContentUnavailable).unwrap();
        assert_eq!(json, "\"content-unavailable\"");

        let decoded: ErrorCode = serde_json::from_str("\"rate-limited\"").unwrap();
        assert_eq!(decoded, ErrorCode::RateLimited);
    }

    #[test]
    fn retryability_classification() {
        assert!(ErrorCode::AcquisitionFailed.is_retryable());
        assert!(ErrorCode::TranscriptionUnavailable.is_retryable());
        assert!(!ErrorCode::ContentUnavailable.is_retryable());
        assert!(!ErrorCode::InvalidUrl.is_retryable());
        assert!(!ErrorCode::InsufficientCredits.is_retryable());
    }

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
        assert_eq!(ErrorCode::InsufficientCredits.http_status(), 402);
        assert_eq!(ErrorCode::ContentUnavailable.http_status(), 404);
        assert_eq!(ErrorCode::InvalidUrl.http_status(), 400);
    }

    #[test]
    fn every_code_has_a_suggested_action() {
        let codes = [
            ErrorCode::RateLimited,
            ErrorCode::InsufficientCredits,
            ErrorCode::LedgerUnavailable,
            ErrorCode::InvalidUrl,
            ErrorCode::UnsupportedPlatform,
            ErrorCode::MissingField,
            ErrorCode::ContentUnavailable,
            ErrorCode::AcquisitionFailed,
            ErrorCode::TranscriptionUnavailable,
            ErrorCode::TranscriptionMalformed,
            ErrorCode::AttachFailed,
            ErrorCode::QueueUnavailable,
            ErrorCode::Internal,
        ];
        for code in codes {
            assert!(!code.suggested_action().is_empty(), "{code}");
        }
    }
}
