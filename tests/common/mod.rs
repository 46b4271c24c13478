//! Shared test utilities
#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;

use smartflow_gateway::audio::SAMPLE_RATE;
use smartflow_gateway::voice::{ContextRetriever, Generator, Synthesizer, Transcriber};
use smartflow_gateway::{Error, Result};

/// Generate raw 16-bit LE PCM of a sine tone at the canonical rate
pub fn sine_pcm(frequency: f32, duration_ms: u32, amplitude: f32) -> Vec<u8> {
    let num_samples = SAMPLE_RATE as usize * duration_ms as usize / 1000;
    let mut pcm = Vec::with_capacity(num_samples * 2);
    for i in 0..num_samples {
        let t = i as f32 / SAMPLE_RATE as f32;
        let value = (amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin() * 32767.0)
            .clamp(-32768.0, 32767.0) as i16;
        pcm.extend_from_slice(&value.to_le_bytes());
    }
    pcm
}

/// Generate raw PCM silence at the canonical rate
pub fn silence_pcm(duration_ms: u32) -> Vec<u8> {
    vec![0u8; SAMPLE_RATE as usize * duration_ms as usize / 1000 * 2]
}

/// Transcriber stub recording the byte length of each call
pub struct MockTranscriber {
    pub reply: String,
    pub fail: bool,
    pub calls: Mutex<Vec<usize>>,
}

impl MockTranscriber {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        self.calls.lock().unwrap().push(audio.len());
        if self.fail {
            return Err(Error::Stt("mock transcription failure".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// Retriever stub
pub struct MockRetriever {
    pub context: String,
    pub fail: bool,
}

#[async_trait]
impl ContextRetriever for MockRetriever {
    async fn retrieve(&self, _query: &str, _user_id: u64) -> Result<String> {
        if self.fail {
            return Err(Error::Retrieval("mock retrieval failure".to_string()));
        }
        Ok(self.context.clone())
    }
}

/// Generator stub recording the context it was given
pub struct MockGenerator {
    pub reply: String,
    pub fail: bool,
    pub contexts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
            contexts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, _message: &str, context: &str) -> Result<String> {
        self.contexts.lock().unwrap().push(context.to_string());
        if self.fail {
            return Err(Error::Llm("mock generation failure".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// Synthesizer stub returning fixed bytes
pub struct MockSynthesizer {
    pub fail: bool,
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
        if self.fail {
            return Err(Error::Tts("mock synthesis failure".to_string()));
        }
        Ok(vec![0xFF, 0xFB, 0x90, 0x00])
    }
}
