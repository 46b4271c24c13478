//! Voice collaborators: transcription, retrieval, generation, synthesis
//!
//! Each pipeline stage sits behind a trait so the orchestrator can be
//! exercised with fakes in tests and so providers can be swapped without
//! touching session handling. The shipped implementations all talk to
//! OpenAI-compatible HTTP APIs.

pub mod llm;
pub mod retrieval;
pub mod stt;
pub mod tts;

pub use llm::ChatGenerator;
pub use retrieval::VectorSearchRetriever;
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use async_trait::async_trait;

use crate::Result;

/// Converts audio to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio bytes to text
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Fetches conversational context for a query
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Retrieve context snippets relevant to `query` for `user_id`
    async fn retrieve(&self, query: &str, user_id: u64) -> Result<String>;
}

/// Generates an assistant reply
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply to `message` given retrieved `context`
    async fn generate(&self, message: &str, context: &str) -> Result<String>;
}

/// Converts text to spoken audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` to MP3 bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}
