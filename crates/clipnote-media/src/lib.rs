//! Media acquisition for the Clipnote backend.
//!
//! Given a platform-tagged URL, the [`DownloadChain`] walks an ordered list
//! of acquisition strategies until one yields usable media (raw bytes or a
//! remote-hosted reference). Strategies are data, not control flow: adding or
//! reordering one is a chain-construction change, not a new try/catch ladder.

pub mod chain;
pub mod error;
pub mod strategies;
pub mod strategy;

pub use chain::{ChainConfig, DownloadChain};
pub use error::{AcquisitionError, AcquisitionFailure, MediaResult, StrategyFailure};
pub use strategies::{OEmbedStrategy, TikwmStrategy, YtDlpStrategy};
pub use strategy::DownloadStrategy;
