//! Redis-backed persistence for the Clipnote backend.
//!
//! Holds the only shared mutable state in the system: job records, the
//! append-only credit ledger, and per-user rate windows. All mutations are
//! single-key atomic operations (SET NX claims, INCR counters, list
//! appends); no multi-key transactions are required.

pub mod admission;
pub mod client;
pub mod collections;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod rate;

pub use admission::{AdmissionConfig, AdmissionControl, AdmissionDecision, AdmissionGate};
pub use client::StoreClient;
pub use collections::{CollectionSink, RedisCollectionSink};
pub use error::{StoreError, StoreResult};
pub use jobs::JobRepository;
pub use ledger::CreditLedger;
pub use rate::{RateCheck, RateLimitStore};
