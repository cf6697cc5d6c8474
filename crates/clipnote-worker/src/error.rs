//! Worker error types.

use thiserror::Error;

use clipnote_media::AcquisitionFailure;
use clipnote_models::{ErrorCode, Stage};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Acquisition failed: {}", .0.summary())]
    Acquisition(#[from] AcquisitionFailure),

    #[error("Transcription backend unavailable: {0}")]
    TranscriptionUnavailable(String),

    #[error("Malformed transcription response: {0}")]
    TranscriptionMalformed(String),

    #[error("Attach failed: {message}")]
    AttachFailed {
        message: String,
        /// Credits were already committed; a compensating refund was issued
        after_commit: bool,
    },

    #[error("{stage:?} stage timed out after {secs} seconds")]
    StageTimeout { stage: Stage, secs: u64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] clipnote_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] clipnote_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn transcription_unavailable(msg: impl Into<String>) -> Self {
        Self::TranscriptionUnavailable(msg.into())
    }

    pub fn transcription_malformed(msg: impl Into<String>) -> Self {
        Self::TranscriptionMalformed(msg.into())
    }

    pub fn attach_failed(msg: impl Into<String>, after_commit: bool) -> Self {
        Self::AttachFailed {
            message: msg.into(),
            after_commit,
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether the queue should retry this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Acquisition(failure) => failure.is_retryable(),
            WorkerError::TranscriptionUnavailable(_)
            | WorkerError::StageTimeout { .. }
            | WorkerError::Store(_)
            | WorkerError::Queue(_)
            | WorkerError::Io(_) => true,
            WorkerError::TranscriptionMalformed(_)
            | WorkerError::AttachFailed { .. }
            | WorkerError::ConfigError(_) => false,
        }
    }

    /// Stable code recorded on the job and surfaced to the user.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            WorkerError::Acquisition(failure) => {
                if failure.is_retryable() {
                    ErrorCode::AcquisitionFailed
                } else {
                    ErrorCode::ContentUnavailable
                }
            }
            WorkerError::TranscriptionUnavailable(_) => ErrorCode::TranscriptionUnavailable,
            WorkerError::TranscriptionMalformed(_) => ErrorCode::TranscriptionMalformed,
            WorkerError::AttachFailed { .. } => ErrorCode::AttachFailed,
            WorkerError::StageTimeout { stage, .. } => match stage {
                Stage::Transcribing => ErrorCode::TranscriptionUnavailable,
                Stage::Attaching => ErrorCode::AttachFailed,
                _ => ErrorCode::AcquisitionFailed,
            },
            WorkerError::Store(_) | WorkerError::Queue(_) => ErrorCode::Internal,
            WorkerError::Io(_) => ErrorCode::Internal,
            WorkerError::ConfigError(_) => ErrorCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_media::{AcquisitionError, StrategyFailure};

    fn terminal_failure() -> AcquisitionFailure {
        AcquisitionFailure::new(
            "https://x/1",
            vec![StrategyFailure {
                strategy: "yt-dlp".into(),
                error: AcquisitionError::not_found("private video"),
            }],
        )
    }

    fn network_failure() -> AcquisitionFailure {
        AcquisitionFailure::new(
            "https://x/1",
            vec![StrategyFailure {
                strategy: "yt-dlp".into(),
                error: AcquisitionError::Timeout(30),
            }],
        )
    }

    #[test]
    fn terminal_acquisition_maps_to_content_unavailable() {
        let err = WorkerError::Acquisition(terminal_failure());
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), ErrorCode::ContentUnavailable);
    }

    #[test]
    fn network_acquisition_is_retryable() {
        let err = WorkerError::Acquisition(network_failure());
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), ErrorCode::AcquisitionFailed);
    }

    #[test]
    fn stage_timeout_is_retryable_network_class() {
        let err = WorkerError::StageTimeout {
            stage: Stage::Transcribing,
            secs: 60,
        };
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), ErrorCode::TranscriptionUnavailable);
    }

    #[test]
    fn attach_failure_is_terminal() {
        let err = WorkerError::attach_failed("sink down", true);
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), ErrorCode::AttachFailed);
    }
}
