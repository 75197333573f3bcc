use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::SpeechError;
use crate::usage::record::TRANSCRIPTION_MODEL;

/// An uploaded answer recording.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: String,
}

/// The transcription capability. Providers do not report usage; callers
/// derive billable duration from the clip size.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, SpeechError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: Option<String>,
}

/// OpenAI-compatible whisper endpoint client.
#[derive(Clone)]
pub struct WhisperClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl WhisperClient {
    pub fn new(api_url: String, api_key: String) -> Result<Self, SpeechError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()?,
            api_url,
            api_key,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, SpeechError> {
        let part = Part::bytes(clip.bytes.to_vec())
            .file_name(clip.file_name.clone())
            .mime_str(&clip.mime_type)?;
        let form = Form::new()
            .part("file", part)
            .text("model", TRANSCRIPTION_MODEL);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderError>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(SpeechError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let result: TranscriptionResponse = response.json().await?;
        debug!("Transcribed {} bytes into {} chars", clip.bytes.len(), result.text.len());
        Ok(result.text)
    }
}
