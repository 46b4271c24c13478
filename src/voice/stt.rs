//! Speech-to-text (STT) processing

use async_trait::async_trait;

use crate::voice::Transcriber;
use crate::{Error, Result};

/// Response from the OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes speech to text via an OpenAI-compatible API
pub struct SpeechToText {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl SpeechToText {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_base: String, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "API key required for transcription".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    /// Transcribe WAV audio bytes to text
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API rejects the audio
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
