//! Ordered strategy iteration with per-strategy deadlines.

use std::sync::Arc;

use tracing::{info, warn};

use clipnote_models::{DownloadResult, Platform};

use crate::error::{AcquisitionError, AcquisitionFailure, StrategyFailure};
use crate::strategies::{OEmbedStrategy, TikwmStrategy, YtDlpStrategy};
use crate::strategy::DownloadStrategy;

/// Chain configuration.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Minimum byte payload accepted as valid media. Guards against
    /// placeholder and error-page responses served with a 200.
    pub min_payload_bytes: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            min_payload_bytes: 16 * 1024,
        }
    }
}

impl ChainConfig {
    pub fn from_env() -> Self {
        Self {
            min_payload_bytes: std::env::var("MIN_PAYLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16 * 1024),
        }
    }
}

/// Cascading download chain.
///
/// Strategies are ordered by decreasing reliability; the chain returns the
/// first result whose payload passes the sanity threshold, or an aggregate
/// failure carrying every strategy's reason.
pub struct DownloadChain {
    strategies: Vec<Arc<dyn DownloadStrategy>>,
    config: ChainConfig,
}

impl DownloadChain {
    /// Build a chain from an explicit strategy list (test seam).
    pub fn new(strategies: Vec<Arc<dyn DownloadStrategy>>, config: ChainConfig) -> Self {
        Self { strategies, config }
    }

    /// Build the default production chain. Ordering is reliability-first:
    /// platform APIs, then the yt-dlp extractor, then the public embed
    /// endpoint as a hosted-reference last resort.
    pub fn with_default_strategies(http: reqwest::Client, config: ChainConfig) -> Self {
        Self::new(
            vec![
                Arc::new(TikwmStrategy::new(http.clone())),
                Arc::new(YtDlpStrategy::new()),
                Arc::new(OEmbedStrategy::new(http)),
            ],
            config,
        )
    }

    /// Acquire media for `url`, walking the strategies that support
    /// `platform` in order.
    pub async fn acquire(
        &self,
        url: &str,
        platform: Platform,
    ) -> Result<DownloadResult, AcquisitionFailure> {
        let mut failures = Vec::new();

        for strategy in self.strategies.iter().filter(|s| s.supports(platform)) {
            let name = strategy.name();
            let deadline = strategy.timeout();

            let attempt = tokio::time::timeout(deadline, strategy.acquire(url)).await;

            let outcome = match attempt {
                Ok(result) => result,
                Err(_) => Err(AcquisitionError::Timeout(deadline.as_secs())),
            };

            match outcome {
                Ok(result) => {
                    if !result.hosted() && result.size_bytes < self.config.min_payload_bytes {
                        warn!(
                            strategy = name,
                            size = result.size_bytes,
                            min = self.config.min_payload_bytes,
                            "Strategy returned undersized payload, trying next"
                        );
                        failures.push(StrategyFailure {
                            strategy: name.to_string(),
                            error: AcquisitionError::EmptyPayload {
                                size: result.size_bytes,
                                min: self.config.min_payload_bytes,
                            },
                        });
                        continue;
                    }

                    if !failures.is_empty() {
                        info!(
                            url = url,
                            strategy = name,
                            failed = %failures
                                .iter()
                                .map(|f| f.strategy.as_str())
                                .collect::<Vec<_>>()
                                .join(","),
                            "Acquired media after earlier strategies failed"
                        );
                    }

                    metrics::counter!(
                        "clipnote_downloads_total",
                        "strategy" => name,
                        "platform" => platform.as_str(),
                    )
                    .increment(1);

                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        url = url,
                        strategy = name,
                        error = %e,
                        "Download strategy failed, trying next"
                    );
                    failures.push(StrategyFailure {
                        strategy: name.to_string(),
                        error: e,
                    });
                }
            }
        }

        Err(AcquisitionFailure::new(url, failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clipnote_models::MediaPayload;
    use std::time::Duration;

    /// Stub strategy with a programmable outcome.
    struct StubStrategy {
        name: &'static str,
        timeout: Duration,
        behavior: StubBehavior,
    }

    enum StubBehavior {
        Bytes(usize),
        Hosted,
        Fail(fn() -> AcquisitionError),
        Hang,
    }

    #[async_trait]
    impl DownloadStrategy for StubStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, _platform: Platform) -> bool {
            true
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn acquire(&self, url: &str) -> crate::error::MediaResult<DownloadResult> {
            match &self.behavior {
                StubBehavior::Bytes(n) => {
                    Ok(DownloadResult::from_bytes(vec![0u8; *n], "video/mp4", self.name))
                }
                StubBehavior::Hosted => Ok(DownloadResult::from_hosted(
                    format!("{url}/hosted"),
                    "video/mp4",
                    self.name,
                )),
                StubBehavior::Fail(f) => Err(f()),
                StubBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    fn stub(name: &'static str, behavior: StubBehavior) -> Arc<dyn DownloadStrategy> {
        Arc::new(StubStrategy {
            name,
            timeout: Duration::from_secs(5),
            behavior,
        })
    }

    fn chain(strategies: Vec<Arc<dyn DownloadStrategy>>) -> DownloadChain {
        DownloadChain::new(
            strategies,
            ChainConfig {
                min_payload_bytes: 1024,
            },
        )
    }

    #[tokio::test]
    async fn first_valid_strategy_wins() {
        let chain = chain(vec![
            stub("primary", StubBehavior::Bytes(4096)),
            stub("secondary", StubBehavior::Bytes(4096)),
        ]);

        let result = chain
            .acquire("https://www.tiktok.com/@a/video/1", Platform::Tiktok)
            .await
            .expect("chain succeeds");
        assert_eq!(result.strategy, "primary");
    }

    #[tokio::test]
    async fn all_not_found_is_terminal() {
        let chain = chain(vec![
            stub("primary", StubBehavior::Fail(|| AcquisitionError::not_found("private"))),
            stub("secondary", StubBehavior::Fail(|| AcquisitionError::not_found("removed"))),
        ]);

        let err = chain
            .acquire("https://www.tiktok.com/@a/video/1", Platform::Tiktok)
            .await
            .expect_err("chain fails");
        assert_eq!(err.failures.len(), 2);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn timeout_falls_through_to_hosted_secondary() {
        let hanging = Arc::new(StubStrategy {
            name: "primary",
            timeout: Duration::from_millis(20),
            behavior: StubBehavior::Hang,
        });
        let chain = chain(vec![hanging, stub("secondary", StubBehavior::Hosted)]);

        let result = chain
            .acquire("https://youtu.be/abc123def45", Platform::Youtube)
            .await
            .expect("second strategy succeeds");

        assert!(result.hosted());
        assert_eq!(result.strategy, "secondary");
        assert!(matches!(result.payload, MediaPayload::Hosted(_)));
    }

    #[tokio::test]
    async fn undersized_payload_is_rejected_and_chain_continues() {
        let chain = chain(vec![
            stub("primary", StubBehavior::Bytes(10)),
            stub("secondary", StubBehavior::Bytes(4096)),
        ]);

        let result = chain
            .acquire("https://www.instagram.com/reel/a/", Platform::Instagram)
            .await
            .expect("secondary succeeds");
        assert_eq!(result.strategy, "secondary");
    }

    #[tokio::test]
    async fn undersized_only_chain_is_terminal() {
        let chain = chain(vec![stub("primary", StubBehavior::Bytes(10))]);

        let err = chain
            .acquire("https://www.instagram.com/reel/a/", Platform::Instagram)
            .await
            .expect_err("chain fails");
        assert!(!err.is_retryable());
        assert!(matches!(
            err.failures[0].error,
            AcquisitionError::EmptyPayload { size: 10, .. }
        ));
    }

    #[tokio::test]
    async fn timeout_makes_aggregate_retryable() {
        let hanging = Arc::new(StubStrategy {
            name: "primary",
            timeout: Duration::from_millis(20),
            behavior: StubBehavior::Hang,
        });
        let chain = chain(vec![
            hanging,
            stub("secondary", StubBehavior::Fail(|| AcquisitionError::not_found("gone"))),
        ]);

        let err = chain
            .acquire("https://youtu.be/abc123def45", Platform::Youtube)
            .await
            .expect_err("chain fails");
        assert!(err.is_retryable());
    }
}
