//! Acquisition chain output types.

use serde::{Deserialize, Serialize};

/// Acquired media: either raw bytes or a remote-hosted reference.
///
/// The two forms are mutually exclusive by construction; `DownloadResult`
/// exposes the distinction through the `hosted` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPayload {
    /// Raw media bytes held in memory for the duration of one job.
    Bytes(Vec<u8>),
    /// A remote URL the transcription backend can fetch directly.
    Hosted(String),
}

impl MediaPayload {
    pub fn is_hosted(&self) -> bool {
        matches!(self, MediaPayload::Hosted(_))
    }

    pub fn len(&self) -> usize {
        match self {
            MediaPayload::Bytes(b) => b.len(),
            MediaPayload::Hosted(url) => url.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Platform-specific auxiliary metadata captured during acquisition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Output of the download fallback chain.
///
/// Owned by the worker processing a single job, handed to the transcription
/// adapter, then discarded.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// The acquired payload
    pub payload: MediaPayload,
    /// Payload size in bytes (for hosted results, the reported remote size
    /// when known, otherwise 0)
    pub size_bytes: u64,
    /// MIME type of the media
    pub mime_type: String,
    /// Name of the strategy that produced this result
    pub strategy: String,
    /// Auxiliary platform metadata
    pub metadata: MediaMetadata,
}

impl DownloadResult {
    /// Build a result carrying raw bytes.
    pub fn from_bytes(
        data: Vec<u8>,
        mime_type: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Self {
        let size_bytes = data.len() as u64;
        Self {
            payload: MediaPayload::Bytes(data),
            size_bytes,
            mime_type: mime_type.into(),
            strategy: strategy.into(),
            metadata: MediaMetadata::default(),
        }
    }

    /// Build a result referencing remote-hosted media.
    pub fn from_hosted(
        url: impl Into<String>,
        mime_type: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            payload: MediaPayload::Hosted(url.into()),
            size_bytes: 0,
            mime_type: mime_type.into(),
            strategy: strategy.into(),
            metadata: MediaMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// True when the payload is a remote reference rather than raw bytes.
    pub fn hosted(&self) -> bool {
        self.payload.is_hosted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_result_reports_size_and_not_hosted() {
        let result = DownloadResult::from_bytes(vec![0u8; 2048], "video/mp4", "tikwm");
        assert!(!result.hosted());
        assert_eq!(result.size_bytes, 2048);
        assert_eq!(result.strategy, "tikwm");
    }

    #[test]
    fn hosted_result_is_flagged() {
        let result =
            DownloadResult::from_hosted("https://cdn.example.com/v.mp4", "video/mp4", "oembed");
        assert!(result.hosted());
        assert_eq!(result.size_bytes, 0);
    }
}
