//! Text-to-speech (TTS) processing

use async_trait::async_trait;

use crate::voice::Synthesizer;
use crate::{Error, Result};

/// Synthesizes speech via an OpenAI-compatible API
pub struct TextToSpeech {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    voice: String,
}

impl TextToSpeech {
    /// Create a new TTS client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_base: String, api_key: String, model: String, voice: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_base,
            api_key,
            model,
            voice,
        })
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    /// Synthesize text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS API error");
            return Err(Error::Tts(format!("TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}
