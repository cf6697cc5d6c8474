//! Public embed (oEmbed) strategy.
//!
//! Last-resort strategy: confirms the content is publicly embeddable via the
//! platform's oEmbed endpoint and returns the submitted URL as a
//! remote-hosted reference, with whatever metadata the endpoint exposes.
//! Produces no bytes; the transcription backend fetches the media itself.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use clipnote_models::{DownloadResult, MediaMetadata, Platform};

use crate::error::{AcquisitionError, MediaResult};
use crate::strategy::DownloadStrategy;

/// oEmbed response fields common across the supported platforms.
#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

/// Public embed strategy.
pub struct OEmbedStrategy {
    http: reqwest::Client,
    base_override: Option<String>,
}

impl OEmbedStrategy {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_override: None,
        }
    }

    /// Override every platform's endpoint base (test seam).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_override = Some(base_url.into());
        self
    }

    fn endpoint(&self, platform: Platform, url: &str) -> String {
        let encoded = urlencoding::encode(url);
        let base = match &self.base_override {
            Some(base) => base.clone(),
            None => match platform {
                Platform::Tiktok => "https://www.tiktok.com".to_string(),
                Platform::Instagram => "https://www.instagram.com".to_string(),
                Platform::Youtube => "https://www.youtube.com".to_string(),
            },
        };
        format!("{base}/oembed?url={encoded}&format=json")
    }
}

#[async_trait]
impl DownloadStrategy for OEmbedStrategy {
    fn name(&self) -> &'static str {
        "oembed"
    }

    fn supports(&self, _platform: Platform) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn acquire(&self, url: &str) -> MediaResult<DownloadResult> {
        let platform = Platform::from_url(url)
            .map_err(|e| AcquisitionError::Unsupported(e.to_string()))?;
        let endpoint = self.endpoint(platform, url);

        debug!(url = url, endpoint = %endpoint, "Checking public embed");

        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| AcquisitionError::network(format!("oembed request failed: {e}")))?;

        // oEmbed endpoints answer 404/403 for private or removed content
        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status() == reqwest::StatusCode::FORBIDDEN
            || response.status() == reqwest::StatusCode::UNAUTHORIZED
        {
            return Err(AcquisitionError::not_found(format!(
                "oembed endpoint returned {}",
                response.status()
            )));
        }

        if !response.status().is_success() {
            return Err(AcquisitionError::network(format!(
                "oembed endpoint returned {}",
                response.status()
            )));
        }

        let parsed: OEmbedResponse = response
            .json()
            .await
            .map_err(|e| AcquisitionError::network(format!("oembed parse failed: {e}")))?;

        let metadata = MediaMetadata {
            author: parsed.author_name,
            title: parsed.title,
            view_count: None,
            like_count: None,
            thumbnail_url: parsed.thumbnail_url,
            duration_secs: None,
        };

        Ok(DownloadResult::from_hosted(url, "video/mp4", self.name()).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn public_content_yields_hosted_reference() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oembed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "a reel",
                "author_name": "creator",
                "thumbnail_url": "https://cdn.example.com/t.jpg"
            })))
            .mount(&server)
            .await;

        let strategy = OEmbedStrategy::new(reqwest::Client::new()).with_base_url(server.uri());
        let url = "https://www.instagram.com/reel/abc/";
        let result = strategy.acquire(url).await.expect("acquire succeeds");

        assert!(result.hosted());
        assert_eq!(result.metadata.title.as_deref(), Some("a reel"));
        match &result.payload {
            clipnote_models::MediaPayload::Hosted(hosted) => assert_eq!(hosted, url),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn private_content_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oembed"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let strategy = OEmbedStrategy::new(reqwest::Client::new()).with_base_url(server.uri());
        let err = strategy
            .acquire("https://www.instagram.com/reel/abc/")
            .await
            .expect_err("acquire fails");

        assert!(matches!(err, AcquisitionError::NotFound(_)));
    }
}
