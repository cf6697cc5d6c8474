//! The acquisition strategy capability.

use std::time::Duration;

use async_trait::async_trait;

use clipnote_models::{DownloadResult, Platform};

use crate::error::MediaResult;

/// One concrete method of acquiring media from a source platform.
///
/// Strategies are iterated in order by the [`crate::DownloadChain`]; each
/// carries its own deadline, enforced by the chain independently of the
/// others. A strategy is never retried against itself.
#[async_trait]
pub trait DownloadStrategy: Send + Sync {
    /// Strategy name, recorded on results and failures for observability.
    fn name(&self) -> &'static str;

    /// Whether this strategy can handle the given platform.
    fn supports(&self, platform: Platform) -> bool;

    /// Strategy-local deadline.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Attempt to acquire the media at `url`.
    async fn acquire(&self, url: &str) -> MediaResult<DownloadResult>;
}
