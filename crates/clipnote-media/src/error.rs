//! Error types for media acquisition.

use thiserror::Error;

/// Result type for single-strategy operations.
pub type MediaResult<T> = Result<T, AcquisitionError>;

/// Typed failure from one acquisition strategy.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Strategy timed out after {0} seconds")]
    Timeout(u64),

    #[error("Unsupported source: {0}")]
    Unsupported(String),

    #[error("Payload too small: {size} bytes (minimum {min})")]
    EmptyPayload { size: u64, min: u64 },

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl AcquisitionError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Network-class failures may succeed on a later attempt; content-class
    /// failures will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AcquisitionError::Network(_)
                | AcquisitionError::Timeout(_)
                | AcquisitionError::Io(_)
        )
    }

    /// Classify a yt-dlp stderr tail into a typed failure.
    ///
    /// Private, removed, and region-blocked content is permanent; anything
    /// else from the tool is treated as a network-class failure.
    pub fn from_ytdlp_stderr(stderr: &str) -> Self {
        let msg = stderr.to_lowercase();

        let permanent = msg.contains("private video")
            || msg.contains("video is private")
            || msg.contains("video unavailable")
            || msg.contains("video is unavailable")
            || msg.contains("has been removed")
            || msg.contains("was deleted")
            || msg.contains("account has been terminated")
            || (msg.contains("age") && (msg.contains("restrict") || msg.contains("verif")))
            || (msg.contains("copyright") && msg.contains("block"))
            || msg.contains("not available in your country");

        let tail = stderr.lines().last().unwrap_or("unknown error").to_string();
        if permanent {
            AcquisitionError::NotFound(tail)
        } else {
            AcquisitionError::Network(tail)
        }
    }
}

/// One strategy's failure, recorded for diagnostics.
#[derive(Debug)]
pub struct StrategyFailure {
    /// Strategy name
    pub strategy: String,
    /// The typed failure it returned
    pub error: AcquisitionError,
}

/// Aggregate failure after every strategy in a chain was exhausted.
#[derive(Debug, Error)]
#[error("All {} download strategies failed for {url}", .failures.len())]
pub struct AcquisitionFailure {
    /// Submitted URL
    pub url: String,
    /// Per-strategy failure reasons, in chain order
    pub failures: Vec<StrategyFailure>,
}

impl AcquisitionFailure {
    pub fn new(url: impl Into<String>, failures: Vec<StrategyFailure>) -> Self {
        Self {
            url: url.into(),
            failures,
        }
    }

    /// The chain failure is retryable iff any strategy failed for a
    /// network-class reason. When every strategy reported the content as
    /// gone, retrying cannot help.
    pub fn is_retryable(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_retryable())
    }

    /// Diagnostic summary listing each strategy and its failure.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("{}: {}", f.strategy, f.error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
