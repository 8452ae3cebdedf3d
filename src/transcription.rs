use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::TranscriptionConfig;

/// Longest slice of an upstream error body kept in the error message.
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("transcription service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("transcription did not finish within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct AudioClip {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Speech-to-text backend. An empty transcript is a valid result.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    async fn transcribe(&self, clip: AudioClip) -> Result<String, TranscriptionError>;
}

/// Runs `transcriber` but gives up after `limit`. The abandoned request is
/// dropped, not awaited.
pub async fn transcribe_with_timeout(
    transcriber: &dyn Transcriber,
    clip: AudioClip,
    limit: Duration,
) -> Result<String, TranscriptionError> {
    match tokio::time::timeout(limit, transcriber.transcribe(clip)).await {
        Ok(result) => result,
        Err(_) => Err(TranscriptionError::TimedOut(limit)),
    }
}

/// Canned transcriber for mock mode. The transcript only depends on the clip.
pub struct MockTranscriber;

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, clip: AudioClip) -> Result<String, TranscriptionError> {
        Ok(format!(
            "Mock transcription for {} ({} bytes)",
            clip.file_name,
            clip.bytes.len()
        ))
    }
}

/// Multipart client for an OpenAI-style `/v1/audio/transcriptions` endpoint.
pub struct HttpTranscriber {
    client: Client,
    endpoint: String,
    token: String,
    file_field: String,
    model: String,
}

#[derive(Deserialize)]
struct TranscriptionPayload {
    text: Option<String>,
    transcription: Option<String>,
}

impl HttpTranscriber {
    /// Returns `None` when no API token is configured.
    pub fn from_config(config: &TranscriptionConfig) -> Option<Self> {
        let token = config.token.clone()?;
        Some(Self {
            client: Client::new(),
            endpoint: transcription_endpoint(&config.base_url),
            token,
            file_field: config.file_field.clone(),
            model: config.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transcription_endpoint(base_url: &str) -> String {
    let mut base = base_url.trim_end_matches('/').to_string();
    if !base.ends_with("/backend") {
        base.push_str("/backend");
    }
    format!("{base}/v1/audio/transcriptions")
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, clip: AudioClip) -> Result<String, TranscriptionError> {
        let content_type = if clip.content_type.parse::<mime_guess::Mime>().is_ok() {
            clip.content_type.as_str()
        } else {
            "application/octet-stream"
        };
        let part = multipart::Part::bytes(clip.bytes)
            .file_name(clip.file_name.clone())
            .mime_str(content_type)?;
        let form = multipart::Form::new()
            .part(self.file_field.clone(), part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header("x-api-key", &self.token)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(TranscriptionError::Status { status, body });
        }

        let payload: TranscriptionPayload = response.json().await?;
        let text = payload
            .text
            .filter(|text| !text.is_empty())
            .or(payload.transcription)
            .unwrap_or_default();
        debug!(file = %clip.file_name, chars = text.len(), "transcription received");
        Ok(text)
    }
}
