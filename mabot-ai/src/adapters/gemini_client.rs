//! Gemini `generateContent` client
//!
//! Implements both model-facing seams: transcription and structured analysis
//! (JSON response mode). Requests are throttled to the configured
//! requests-per-minute. Each call is a single attempt; the pipeline's retry
//! policy decides what happens on failure.
//!
//! Recordings up to [`MAX_INLINE_BYTES`] travel as inline base64 data. Larger
//! ones are uploaded through the File API (resumable upload), referenced by
//! URI in the request, and deleted once transcription is done.

use crate::error::RemoteError;
use crate::models::AiAnalysis;
use crate::types::{Analyzer, Transcriber};
use anyhow::{Context, Result};
use base64::Engine as _;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use mabot_common::config::LlmConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

/// Largest payload sent inline; bigger recordings are uploaded first
pub const MAX_INLINE_BYTES: usize = 20 * 1024 * 1024;

/// Uploaded media (video mostly) may need server-side processing before use
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const FILE_POLL_ATTEMPTS: u32 = 90;

const TRANSCRIBE_PROMPT: &str =
    "Transcribe the audio verbatim with punctuation. Do not summarize. Output plain text only.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

/// File API resource; `name` is `files/<id>`
#[derive(Debug, Clone, Deserialize)]
struct RemoteFile {
    name: String,
    uri: String,
    state: Option<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    upload_url: String,
    transcribe_model: String,
    analysis_model: String,
    api_key: String,
    temperature: f32,
    prompt: String,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl GeminiClient {
    /// Build a client from `[llm]` settings and a resolved API key and prompt
    pub fn new(config: &LlmConfig, api_key: String, prompt: String) -> Result<Self> {
        let rpm = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_minute(rpm));

        let client = reqwest::Client::builder()
            .user_agent(concat!("mabot-ai/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            upload_url: upload_url(&base_url),
            base_url,
            transcribe_model: config.model.clone(),
            analysis_model: config.analysis_model().to_string(),
            api_key,
            temperature: config.temperature,
            prompt,
            rate_limiter,
        })
    }

    async fn generate(&self, model: &str, body: Value) -> Result<String, RemoteError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!(model = %model, "Calling generateContent");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let text = success_body(response).await?;
        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| RemoteError::non_retryable(format!("malformed model response: {}", e)))?;
        response_text(parsed)
    }

    /// Two-step resumable upload: open a session, then send the bytes
    async fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<RemoteFile, RemoteError> {
        let start = self
            .client
            .post(&self.upload_url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({"file": {"display_name": "mabot-recording"}}))
            .send()
            .await?;

        let status = start.status();
        if !status.is_success() {
            let text = start.text().await?;
            return Err(RemoteError::from_status(status.as_u16(), &text));
        }
        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::non_retryable("upload start returned no session URL"))?;

        let response = self
            .client
            .post(&session_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes.to_vec())
            .send()
            .await?;

        let text = success_body(response).await?;
        let parsed: UploadResponse = serde_json::from_str(&text)
            .map_err(|e| RemoteError::non_retryable(format!("malformed upload response: {}", e)))?;
        debug!(name = %parsed.file.name, bytes = bytes.len(), "Recording uploaded");
        Ok(parsed.file)
    }

    async fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile, RemoteError> {
        for _ in 0..FILE_POLL_ATTEMPTS {
            if is_active(&file)? {
                return Ok(file);
            }
            tokio::time::sleep(FILE_POLL_INTERVAL).await;

            let response = self
                .client
                .get(format!("{}/{}", self.base_url, file.name))
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await?;
            let text = success_body(response).await?;
            file = serde_json::from_str(&text)
                .map_err(|e| RemoteError::non_retryable(format!("malformed file status: {}", e)))?;
        }
        Err(RemoteError::retryable(format!("uploaded file {} still processing", file.name)))
    }

    /// Best effort; uploads also expire on their own
    async fn delete_upload(&self, name: &str) {
        let result = self
            .client
            .delete(format!("{}/{}", self.base_url, name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => debug!(name = %name, "Upload deleted"),
            Ok(response) => warn!(name = %name, status = %response.status(), "Could not delete upload"),
            Err(e) => warn!(name = %name, error = %e, "Could not delete upload"),
        }
    }
}

/// Body of a 2xx response, or the classified failure
async fn success_body(response: reqwest::Response) -> Result<String, RemoteError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(RemoteError::from_status(status.as_u16(), &text));
    }
    Ok(text)
}

/// `https://host/v1beta` -> `https://host/upload/v1beta/files`
fn upload_url(base_url: &str) -> String {
    match base_url.rsplit_once('/') {
        Some((root, version)) if root.contains("://") => format!("{}/upload/{}/files", root, version),
        _ => format!("{}/upload/files", base_url),
    }
}

/// Whether an uploaded file can be referenced yet
fn is_active(file: &RemoteFile) -> Result<bool, RemoteError> {
    match file.state.as_deref() {
        None | Some("ACTIVE") => Ok(true),
        Some("FAILED") => Err(RemoteError::non_retryable(format!(
            "uploaded file {} failed processing",
            file.name
        ))),
        Some(_) => Ok(false),
    }
}

fn transcribe_body(media: Value) -> Value {
    json!({
        "contents": [{
            "parts": [
                media,
                {"text": TRANSCRIBE_PROMPT},
            ]
        }]
    })
}

fn inline_part(bytes: &[u8], mime_type: &str) -> Value {
    json!({"inline_data": {
        "mime_type": mime_type,
        "data": base64::engine::general_purpose::STANDARD.encode(bytes),
    }})
}

fn file_part(uri: &str, mime_type: &str) -> Value {
    json!({"file_data": {
        "mime_type": mime_type,
        "file_uri": uri,
    }})
}

/// Concatenated text of the first candidate
fn response_text(response: GenerateResponse) -> Result<String, RemoteError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(RemoteError::non_retryable(format!("prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RemoteError::non_retryable("no response candidates"))?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(RemoteError::non_retryable("response blocked by safety settings"));
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();
    Ok(text.trim().to_string())
}

#[async_trait::async_trait]
impl Transcriber for GeminiClient {
    async fn transcribe(&self, bytes: &[u8], mime_type: &str) -> Result<String, RemoteError> {
        if bytes.len() <= MAX_INLINE_BYTES {
            let body = transcribe_body(inline_part(bytes, mime_type));
            return self.generate(&self.transcribe_model, body).await;
        }

        debug!(bytes = bytes.len(), "Recording above inline limit, using File API");
        let uploaded = self.upload(bytes, mime_type).await?;
        let result = match self.wait_until_active(uploaded.clone()).await {
            Ok(file) => {
                let body = transcribe_body(file_part(&file.uri, mime_type));
                self.generate(&self.transcribe_model, body).await
            }
            Err(e) => Err(e),
        };
        self.delete_upload(&uploaded.name).await;
        result
    }
}

#[async_trait::async_trait]
impl Analyzer for GeminiClient {
    async fn analyze(&self, transcript: &str) -> Result<AiAnalysis, RemoteError> {
        let body = json!({
            "contents": [{
                "parts": [
                    {"text": self.prompt},
                    {"text": "\n\n---\nMEETING TRANSCRIPT:\n"},
                    {"text": transcript},
                ]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "responseMimeType": "application/json",
            }
        });

        let raw = self.generate(&self.analysis_model, body).await?;
        AiAnalysis::from_model_text(&raw)
    }
}
