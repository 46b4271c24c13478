//! Voice pipeline orchestration
//!
//! Runs a finalized stream through normalize -> transcribe -> retrieve ->
//! generate -> synthesize. Stages degrade independently: transcription is
//! the only fatal stage for audio input, because without text nothing
//! downstream can run. Normalization failure falls back to the raw buffered
//! bytes, retrieval failure runs generation contextless, generation failure
//! substitutes a fixed apology, and synthesis failure delivers a text-only
//! result.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::audio::normalize::{normalize_to_wav, pcm_to_wav};
use crate::audio::vad::VadSegmenter;
use crate::config::VadSettings;
use crate::voice::{ContextRetriever, Generator, Synthesizer, Transcriber};
use crate::{Error, Result};

/// Reply substituted when generation fails
pub const APOLOGY: &str = "Sorry, I'm having trouble generating a response right now.";

/// What the pipeline is asked to process
#[derive(Debug, Clone)]
pub enum PipelineInput {
    /// Buffered audio artifact from a streaming session
    Audio(PathBuf),
    /// Already-textual user message
    Text(String),
}

/// Final result delivered to the client
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineResult {
    /// Transcribed user message, absent for text input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,

    /// Assistant reply text
    pub response: String,

    /// URL of the synthesized reply, null when synthesis is off or failed
    pub audio_url: Option<String>,
}

/// Orchestrates the voice pipeline stages
pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    generator: Arc<dyn Generator>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    audio_dir: PathBuf,
    vad: VadSettings,
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators
    ///
    /// `retriever` and `synthesizer` are optional stages; the pipeline runs
    /// contextless and text-only respectively when they are absent.
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        retriever: Option<Arc<dyn ContextRetriever>>,
        generator: Arc<dyn Generator>,
        synthesizer: Option<Arc<dyn Synthesizer>>,
        audio_dir: PathBuf,
        vad: VadSettings,
    ) -> Self {
        Self {
            transcriber,
            retriever,
            generator,
            synthesizer,
            audio_dir,
            vad,
        }
    }

    /// Run one request through the pipeline
    ///
    /// # Errors
    ///
    /// Returns error only when transcription of audio input fails; every
    /// other stage degrades instead.
    pub async fn process(&self, input: PipelineInput, user_id: u64) -> Result<PipelineResult> {
        let (message, transcription) = match input {
            PipelineInput::Audio(path) => {
                let text = self.transcribe(&path).await?;
                (text.clone(), Some(text))
            }
            PipelineInput::Text(text) => (text, None),
        };

        if message.trim().is_empty() {
            return Err(Error::Stt("transcription produced no text".to_string()));
        }

        let context = self.retrieve(&message, user_id).await;
        let response = self.generate(&message, &context).await;
        let audio_url = self.synthesize(&response).await;

        Ok(PipelineResult {
            transcription,
            response,
            audio_url,
        })
    }

    /// Normalize and transcribe a buffered audio artifact
    async fn transcribe(&self, path: &std::path::Path) -> Result<String> {
        let audio = match normalize_to_wav(path).await {
            Ok(normalized) => {
                let wav = tokio::fs::read(&normalized).await?;
                if let Err(e) = tokio::fs::remove_file(&normalized).await {
                    tracing::debug!(error = %e, "normalized artifact cleanup failed");
                }
                self.trim_silence(wav)
            }
            Err(e) => {
                tracing::warn!(
                    input = %path.display(),
                    error = %e,
                    "normalization failed, transcribing raw buffer"
                );
                tokio::fs::read(path).await?
            }
        };

        self.transcriber.transcribe(&audio).await
    }

    /// Drop silent spans from canonical WAV bytes when VAD is enabled
    ///
    /// Falls back to the untrimmed audio if segmentation finds nothing or
    /// the WAV cannot be rebuilt.
    fn trim_silence(&self, wav: Vec<u8>) -> Vec<u8> {
        if !self.vad.enabled {
            return wav;
        }

        let pcm = {
            let mut reader = match hound::WavReader::new(std::io::Cursor::new(&wav)) {
                Ok(reader) => reader,
                Err(e) => {
                    tracing::warn!(error = %e, "VAD skipped, unreadable WAV");
                    return wav;
                }
            };
            let mut pcm = Vec::new();
            for sample in reader.samples::<i16>() {
                match sample {
                    Ok(value) => pcm.extend_from_slice(&value.to_le_bytes()),
                    Err(e) => {
                        tracing::warn!(error = %e, "VAD skipped, corrupt samples");
                        return wav;
                    }
                }
            }
            pcm
        };

        let voiced: Vec<u8> = VadSegmenter::new(&pcm, &self.vad)
            .flat_map(|segment| segment.pcm)
            .collect();

        if voiced.is_empty() {
            tracing::debug!("no voiced segments, transcribing full audio");
            return wav;
        }

        tracing::debug!(
            input_bytes = pcm.len(),
            voiced_bytes = voiced.len(),
            "silence trimmed"
        );
        match pcm_to_wav(&voiced) {
            Ok(trimmed) => trimmed,
            Err(e) => {
                tracing::warn!(error = %e, "VAD re-encode failed, transcribing full audio");
                wav
            }
        }
    }

    /// Fetch context, degrading to contextless on failure
    async fn retrieve(&self, message: &str, user_id: u64) -> String {
        let Some(retriever) = &self.retriever else {
            return String::new();
        };
        match retriever.retrieve(message, user_id).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, continuing without context");
                String::new()
            }
        }
    }

    /// Generate a reply, degrading to the apology on failure
    async fn generate(&self, message: &str, context: &str) -> String {
        match self.generator.generate(message, context).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "generation failed, sending apology");
                APOLOGY.to_string()
            }
        }
    }

    /// Synthesize the reply and store it under the media directory
    ///
    /// Returns the public URL of the stored audio, or `None` when synthesis
    /// is disabled or failed.
    async fn synthesize(&self, text: &str) -> Option<String> {
        let synthesizer = self.synthesizer.as_ref()?;

        let audio = match synthesizer.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed, delivering text only");
                return None;
            }
        };

        let filename = format!("{}.mp3", Uuid::new_v4());
        let path = self.audio_dir.join(&filename);
        if let Err(e) = tokio::fs::write(&path, &audio).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to store reply audio");
            return None;
        }

        Some(format!("/static/audio/{}", urlencoding::encode(&filename)))
    }
}
