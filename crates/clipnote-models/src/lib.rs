//! Shared data models for the Clipnote backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their lifecycle state machine
//! - Source platforms and URL classification
//! - Download results from the acquisition chain
//! - Transcripts and derived script components
//! - Credit ledger entries, plan tiers, and rate windows
//! - The stable error-code taxonomy surfaced at the API boundary

pub mod credit;
pub mod download;
pub mod error_code;
pub mod job;
pub mod platform;
pub mod rate;
pub mod transcript;

// Re-export common types
pub use credit::{
    period_key, CreditLedgerEntry, CreditOperation, CreditPeriod, PlanTier, TRANSCRIPTION_CREDIT_COST,
};
pub use download::{DownloadResult, MediaMetadata, MediaPayload};
pub use error_code::ErrorCode;
pub use job::{ClipId, JobError, JobId, JobRecord, JobStatus, Priority, Stage, StageProgress};
pub use platform::{Platform, PlatformError};
pub use rate::{RateLimitKind, RateWindow};
pub use transcript::{ClipResult, ScriptComponents};
