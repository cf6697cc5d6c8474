//! Transcription adapter for the generative analysis backend.
//!
//! Sends acquired media (inline bytes or a remote reference) to Gemini and
//! parses a structured transcript + script components out of the response.
//! Responses are parsed strictly; one local repair attempt is made before
//! the configured malformed-response policy applies.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clipnote_models::{DownloadResult, MediaPayload, ScriptComponents};

use crate::error::{WorkerError, WorkerResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const TRANSCRIBE_PROMPT: &str = "Transcribe the spoken audio of this video. Then derive the \
script structure. Respond with a single JSON object with exactly these fields: \
\"transcript\" (full transcript text), \"hook\" (the opening line), \
\"main_points\" (array of the main talking points in order), and \
\"call_to_action\" (the closing ask, or an empty string).";

/// What to do when the backend's response stays malformed after one repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedResponsePolicy {
    /// Degrade gracefully: keep the raw text as the transcript, flag the
    /// result as degraded, and let the job succeed.
    Placeholder,
    /// Fail the job with a terminal transcription-malformed error.
    Fail,
}

impl MalformedResponsePolicy {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fail" => Self::Fail,
            _ => Self::Placeholder,
        }
    }
}

/// A parsed transcription.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub transcript: String,
    pub components: ScriptComponents,
    /// True when the placeholder fallback was used
    pub degraded: bool,
}

/// Transcription capability consumed by the processor.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media: &DownloadResult) -> WorkerResult<Transcription>;
}

// =============================================================================
// Gemini wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    #[serde(rename_all = "camelCase")]
    InlineData { mime_type: String, data: String },
    #[serde(rename_all = "camelCase")]
    FileData { mime_type: String, file_uri: String },
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// The JSON shape the model is instructed to return.
#[derive(Debug, Deserialize)]
struct TranscriptPayload {
    transcript: String,
    #[serde(default)]
    hook: String,
    #[serde(default)]
    main_points: Vec<String>,
    #[serde(default)]
    call_to_action: String,
}

// =============================================================================
// Parsing
// =============================================================================

/// Strictly parse the model output into a payload.
fn parse_payload(text: &str) -> Result<TranscriptPayload, serde_json::Error> {
    serde_json::from_str(text.trim())
}

/// One local repair attempt: strip markdown fences and cut to the outermost
/// JSON object.
fn repair_response(text: &str) -> Option<String> {
    let stripped = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(stripped[start..=end].to_string())
}

/// Parse with repair, applying the malformed-response policy.
fn parse_with_policy(
    text: &str,
    policy: MalformedResponsePolicy,
) -> WorkerResult<Transcription> {
    match parse_payload(text) {
        Ok(payload) => Ok(payload.into()),
        Err(first_err) => {
            debug!(error = %first_err, "Strict parse failed, attempting repair");

            if let Some(repaired) = repair_response(text) {
                if let Ok(payload) = parse_payload(&repaired) {
                    warn!("Transcription response required repair before parsing");
                    return Ok(payload.into());
                }
            }

            match policy {
                MalformedResponsePolicy::Placeholder => {
                    warn!("Transcription response malformed, using placeholder result");
                    Ok(Transcription {
                        transcript: text.trim().to_string(),
                        components: ScriptComponents::default(),
                        degraded: true,
                    })
                }
                MalformedResponsePolicy::Fail => Err(WorkerError::transcription_malformed(
                    format!("response did not parse: {first_err}"),
                )),
            }
        }
    }
}

impl From<TranscriptPayload> for Transcription {
    fn from(payload: TranscriptPayload) -> Self {
        Self {
            transcript: payload.transcript,
            components: ScriptComponents {
                hook: payload.hook,
                main_points: payload.main_points,
                call_to_action: payload.call_to_action,
            },
            degraded: false,
        }
    }
}

// =============================================================================
// Gemini client
// =============================================================================

/// Gemini transcription client.
pub struct GeminiTranscriber {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    policy: MalformedResponsePolicy,
}

impl GeminiTranscriber {
    /// Create a new client. Requires `GEMINI_API_KEY`.
    pub fn new(http: Client, policy: MalformedResponsePolicy) -> WorkerResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| WorkerError::config_error("GEMINI_API_KEY not set"))?;

        Ok(Self {
            http,
            api_key,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: DEFAULT_BASE_URL.to_string(),
            policy,
        })
    }

    /// Override the API base URL (test seam).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn media_part(media: &DownloadResult) -> Part {
        match &media.payload {
            MediaPayload::Bytes(bytes) => Part::InlineData {
                mime_type: media.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
            MediaPayload::Hosted(url) => Part::FileData {
                mime_type: media.mime_type.clone(),
                file_uri: url.clone(),
            },
        }
    }
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    async fn transcribe(&self, media: &DownloadResult) -> WorkerResult<Transcription> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text(TRANSCRIBE_PROMPT.to_string()),
                    Self::media_part(media),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkerError::transcription_unavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(WorkerError::transcription_unavailable(format!(
                "backend returned {}",
                response.status()
            )));
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            WorkerError::transcription_unavailable(format!("response read failed: {e}"))
        })?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                WorkerError::transcription_malformed("backend returned no candidates")
            })?;

        parse_with_policy(&text, self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_PAYLOAD: &str = r#"{
        "transcript": "hello world",
        "hook": "hello",
        "main_points": ["world"],
        "call_to_action": "like and subscribe"
    }"#;

    #[test]
    fn strict_parse_accepts_valid_payload() {
        let result = parse_with_policy(VALID_PAYLOAD, MalformedResponsePolicy::Fail)
            .expect("parses");
        assert_eq!(result.transcript, "hello world");
        assert_eq!(result.components.main_points, vec!["world"]);
        assert!(!result.degraded);
    }

    #[test]
    fn repair_strips_markdown_fences() {
        let fenced = format!("```json\n{VALID_PAYLOAD}\n```");
        let result =
            parse_with_policy(&fenced, MalformedResponsePolicy::Fail).expect("repaired");
        assert_eq!(result.components.hook, "hello");
        assert!(!result.degraded);
    }

    #[test]
    fn repair_extracts_embedded_object() {
        let noisy = format!("Here is the result:\n{VALID_PAYLOAD}\nHope that helps!");
        let result = parse_with_policy(&noisy, MalformedResponsePolicy::Fail).expect("repaired");
        assert_eq!(result.transcript, "hello world");
    }

    #[test]
    fn placeholder_policy_degrades_instead_of_failing() {
        let garbage = "I could not produce JSON, sorry. The video says hello.";
        let result = parse_with_policy(garbage, MalformedResponsePolicy::Placeholder)
            .expect("degrades");
        assert!(result.degraded);
        assert!(result.transcript.contains("hello"));
        assert!(result.components.main_points.is_empty());
    }

    #[test]
    fn fail_policy_surfaces_terminal_error() {
        let garbage = "not json at all";
        let err = parse_with_policy(garbage, MalformedResponsePolicy::Fail)
            .expect_err("fails");
        assert!(matches!(err, WorkerError::TranscriptionMalformed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn transcribes_hosted_media_end_to_end() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": VALID_PAYLOAD }] }
                }]
            })))
            .mount(&server)
            .await;

        std::env::set_var("GEMINI_API_KEY", "test-key");
        let transcriber =
            GeminiTranscriber::new(Client::new(), MalformedResponsePolicy::Placeholder)
                .expect("client")
                .with_base_url(server.uri());

        let media = clipnote_models::DownloadResult::from_hosted(
            "https://youtu.be/abc123def45",
            "video/mp4",
            "oembed",
        );

        let result = transcriber.transcribe(&media).await.expect("transcribes");
        assert_eq!(result.transcript, "hello world");
        assert!(!result.degraded);
    }

    #[tokio::test]
    async fn backend_error_is_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.+:generateContent$"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        std::env::set_var("GEMINI_API_KEY", "test-key");
        let transcriber =
            GeminiTranscriber::new(Client::new(), MalformedResponsePolicy::Placeholder)
                .expect("client")
                .with_base_url(server.uri());

        let media =
            clipnote_models::DownloadResult::from_bytes(vec![0u8; 64], "video/mp4", "tikwm");

        let err = transcriber.transcribe(&media).await.expect_err("fails");
        assert!(matches!(err, WorkerError::TranscriptionUnavailable(_)));
        assert!(err.is_retryable());
    }
}
