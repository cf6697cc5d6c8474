//! TikTok metadata API + CDN fetch strategy.
//!
//! Resolves the video through the tikwm metadata endpoint, then fetches the
//! returned CDN play URL. Primary strategy for TikTok.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use clipnote_models::{DownloadResult, MediaMetadata, Platform};

use crate::error::{AcquisitionError, MediaResult};
use crate::strategy::DownloadStrategy;

const DEFAULT_BASE_URL: &str = "https://www.tikwm.com";

/// Metadata API response envelope.
#[derive(Debug, Deserialize)]
struct TikwmResponse {
    code: i32,
    #[serde(default)]
    msg: String,
    data: Option<TikwmData>,
}

#[derive(Debug, Deserialize)]
struct TikwmData {
    /// Watermark-free CDN play URL
    play: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    play_count: Option<u64>,
    #[serde(default)]
    digg_count: Option<u64>,
    #[serde(default)]
    author: Option<TikwmAuthor>,
}

#[derive(Debug, Deserialize)]
struct TikwmAuthor {
    #[serde(default)]
    nickname: Option<String>,
}

/// TikTok metadata + CDN fetch.
pub struct TikwmStrategy {
    http: reqwest::Client,
    base_url: String,
}

impl TikwmStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (test seam).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Resolve a CDN play URL from a relative or absolute API response value.
    fn absolute_play_url(&self, play: &str) -> String {
        if play.starts_with("http://") || play.starts_with("https://") {
            play.to_string()
        } else {
            format!("{}/{}", self.base_url, play.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl DownloadStrategy for TikwmStrategy {
    fn name(&self) -> &'static str {
        "tikwm"
    }

    fn supports(&self, platform: Platform) -> bool {
        platform == Platform::Tiktok
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }

    async fn acquire(&self, url: &str) -> MediaResult<DownloadResult> {
        let api_url = format!("{}/api/?url={}", self.base_url, urlencoding::encode(url));
        debug!(url = url, "Resolving TikTok media via metadata API");

        let response = self
            .http
            .get(&api_url)
            .send()
            .await
            .map_err(|e| AcquisitionError::network(format!("metadata request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AcquisitionError::network(format!(
                "metadata endpoint returned {}",
                response.status()
            )));
        }

        let parsed: TikwmResponse = response
            .json()
            .await
            .map_err(|e| AcquisitionError::network(format!("metadata parse failed: {e}")))?;

        if parsed.code != 0 {
            // The API signals removed/private content with a non-zero code
            return Err(AcquisitionError::not_found(format!(
                "metadata API code {}: {}",
                parsed.code, parsed.msg
            )));
        }

        let data = parsed
            .data
            .ok_or_else(|| AcquisitionError::not_found("metadata API returned no data"))?;

        let play_url = self.absolute_play_url(&data.play);
        let media = self
            .http
            .get(&play_url)
            .send()
            .await
            .map_err(|e| AcquisitionError::network(format!("CDN fetch failed: {e}")))?;

        if !media.status().is_success() {
            return Err(AcquisitionError::network(format!(
                "CDN returned {}",
                media.status()
            )));
        }

        let mime_type = media
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("video/mp4")
            .to_string();

        let bytes = media
            .bytes()
            .await
            .map_err(|e| AcquisitionError::network(format!("CDN body read failed: {e}")))?;

        let metadata = MediaMetadata {
            author: data.author.and_then(|a| a.nickname),
            title: data.title,
            view_count: data.play_count,
            like_count: data.digg_count,
            thumbnail_url: data.cover,
            duration_secs: data.duration,
        };

        Ok(DownloadResult::from_bytes(bytes.to_vec(), mime_type, self.name())
            .with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_metadata_then_fetches_cdn_payload() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "msg": "success",
                "data": {
                    "play": "/video/play/abc.mp4",
                    "title": "test clip",
                    "duration": 14.2,
                    "play_count": 1000,
                    "digg_count": 50,
                    "author": { "nickname": "creator" }
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/video/play/abc.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "video/mp4")
                    .set_body_bytes(vec![7u8; 4096]),
            )
            .mount(&server)
            .await;

        let strategy = TikwmStrategy::new(reqwest::Client::new()).with_base_url(server.uri());
        let result = strategy
            .acquire("https://www.tiktok.com/@creator/video/1")
            .await
            .expect("acquire succeeds");

        assert!(!result.hosted());
        assert_eq!(result.size_bytes, 4096);
        assert_eq!(result.metadata.author.as_deref(), Some("creator"));
        assert_eq!(result.metadata.view_count, Some(1000));
    }

    #[tokio::test]
    async fn non_zero_code_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": -1,
                "msg": "video has been removed"
            })))
            .mount(&server)
            .await;

        let strategy = TikwmStrategy::new(reqwest::Client::new()).with_base_url(server.uri());
        let err = strategy
            .acquire("https://www.tiktok.com/@creator/video/1")
            .await
            .expect_err("acquire fails");

        assert!(matches!(err, AcquisitionError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_network_class() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let strategy = TikwmStrategy::new(reqwest::Client::new()).with_base_url(server.uri());
        let err = strategy
            .acquire("https://www.tiktok.com/@creator/video/1")
            .await
            .expect_err("acquire fails");

        assert!(err.is_retryable());
    }
}
