//! Source platform classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Supported short-form video platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
        }
    }

    /// Classify a URL by host. Returns an error for malformed URLs or
    /// hosts outside the supported set.
    pub fn from_url(raw: &str) -> Result<Self, PlatformError> {
        let url = Url::parse(raw).map_err(|_| PlatformError::InvalidUrl(raw.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PlatformError::InvalidUrl(raw.to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| PlatformError::InvalidUrl(raw.to_string()))?
            .to_ascii_lowercase();

        let matches_domain = |domain: &str| host == domain || host.ends_with(&format!(".{domain}"));

        if matches_domain("tiktok.com") {
            Ok(Platform::Tiktok)
        } else if matches_domain("instagram.com") {
            Ok(Platform::Instagram)
        } else if matches_domain("youtube.com") || matches_domain("youtu.be") {
            Ok(Platform::Youtube)
        } else {
            Err(PlatformError::Unsupported(host))
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// URL classification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}
