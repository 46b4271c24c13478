//! Pipeline degradation behavior
//!
//! Exercises the orchestrator with stub collaborators: transcription is the
//! only fatal stage, every other stage degrades to a defined fallback.

use std::sync::Arc;

use smartflow_gateway::audio::normalize::pcm_to_wav;
use smartflow_gateway::config::VadSettings;
use smartflow_gateway::voice::{ContextRetriever, Generator, Synthesizer, Transcriber};
use smartflow_gateway::{Pipeline, PipelineInput, APOLOGY};

mod common;
use common::{
    sine_pcm, silence_pcm, MockGenerator, MockRetriever, MockSynthesizer, MockTranscriber,
};

fn vad_off() -> VadSettings {
    VadSettings {
        enabled: false,
        ..VadSettings::default()
    }
}

/// Write canonical WAV audio into a temp dir and return its path
fn wav_input(dir: &tempfile::TempDir, pcm: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join("input.wav");
    std::fs::write(&path, pcm_to_wav(pcm).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn full_pipeline_produces_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        Arc::new(MockTranscriber::replying("what is rust")),
        Some(Arc::new(MockRetriever {
            context: "Rust is a systems language.".to_string(),
            fail: false,
        }) as Arc<dyn ContextRetriever>),
        Arc::new(MockGenerator::replying("Rust is a language.")),
        Some(Arc::new(MockSynthesizer { fail: false }) as Arc<dyn Synthesizer>),
        dir.path().to_path_buf(),
        vad_off(),
    );

    let input = wav_input(&dir, &sine_pcm(440.0, 300, 0.3));
    let result = pipeline
        .process(PipelineInput::Audio(input), 1)
        .await
        .unwrap();

    assert_eq!(result.transcription.as_deref(), Some("what is rust"));
    assert_eq!(result.response, "Rust is a language.");
    let url = result.audio_url.unwrap();
    assert!(url.starts_with("/static/audio/"));
    assert!(url.ends_with(".mp3"));
}

#[tokio::test]
async fn transcription_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        Arc::new(MockTranscriber::failing()),
        None,
        Arc::new(MockGenerator::replying("unused")),
        None,
        dir.path().to_path_buf(),
        vad_off(),
    );

    let input = wav_input(&dir, &sine_pcm(440.0, 300, 0.3));
    let result = pipeline.process(PipelineInput::Audio(input), 1).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn retrieval_failure_degrades_to_contextless() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(MockGenerator::replying("answer"));
    let pipeline = Pipeline::new(
        Arc::new(MockTranscriber::replying("question")),
        Some(Arc::new(MockRetriever {
            context: String::new(),
            fail: true,
        }) as Arc<dyn ContextRetriever>),
        Arc::clone(&generator) as Arc<dyn Generator>,
        None,
        dir.path().to_path_buf(),
        vad_off(),
    );

    let input = wav_input(&dir, &sine_pcm(440.0, 300, 0.3));
    let result = pipeline
        .process(PipelineInput::Audio(input), 1)
        .await
        .unwrap();

    assert_eq!(result.response, "answer");
    // Generation still ran, with empty context
    assert_eq!(generator.contexts.lock().unwrap().as_slice(), &[String::new()]);
}

#[tokio::test]
async fn generation_failure_substitutes_apology() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        Arc::new(MockTranscriber::replying("question")),
        None,
        Arc::new(MockGenerator::failing()),
        Some(Arc::new(MockSynthesizer { fail: false }) as Arc<dyn Synthesizer>),
        dir.path().to_path_buf(),
        vad_off(),
    );

    let input = wav_input(&dir, &sine_pcm(440.0, 300, 0.3));
    let result = pipeline
        .process(PipelineInput::Audio(input), 1)
        .await
        .unwrap();

    assert_eq!(result.response, APOLOGY);
    // The apology is still synthesized
    assert!(result.audio_url.is_some());
}

#[tokio::test]
async fn synthesis_failure_delivers_text_only() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        Arc::new(MockTranscriber::replying("question")),
        None,
        Arc::new(MockGenerator::replying("answer")),
        Some(Arc::new(MockSynthesizer { fail: true }) as Arc<dyn Synthesizer>),
        dir.path().to_path_buf(),
        vad_off(),
    );

    let input = wav_input(&dir, &sine_pcm(440.0, 300, 0.3));
    let result = pipeline
        .process(PipelineInput::Audio(input), 1)
        .await
        .unwrap();

    assert_eq!(result.response, "answer");
    assert!(result.audio_url.is_none());
}

#[tokio::test]
async fn text_input_skips_transcription() {
    let dir = tempfile::tempdir().unwrap();
    let transcriber = Arc::new(MockTranscriber::replying("unused"));
    let pipeline = Pipeline::new(
        Arc::clone(&transcriber) as Arc<dyn Transcriber>,
        None,
        Arc::new(MockGenerator::replying("answer")),
        None,
        dir.path().to_path_buf(),
        vad_off(),
    );

    let result = pipeline
        .process(PipelineInput::Text("typed question".to_string()), 1)
        .await
        .unwrap();

    assert!(result.transcription.is_none());
    assert_eq!(result.response, "answer");
    assert!(transcriber.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn blank_transcription_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        Arc::new(MockTranscriber::replying("   ")),
        None,
        Arc::new(MockGenerator::replying("unused")),
        None,
        dir.path().to_path_buf(),
        vad_off(),
    );

    let input = wav_input(&dir, &sine_pcm(440.0, 300, 0.3));
    assert!(pipeline.process(PipelineInput::Audio(input), 1).await.is_err());
}

#[tokio::test]
async fn vad_trims_silence_before_transcription() {
    let dir = tempfile::tempdir().unwrap();
    let transcriber = Arc::new(MockTranscriber::replying("trimmed"));
    let pipeline = Pipeline::new(
        Arc::clone(&transcriber) as Arc<dyn Transcriber>,
        None,
        Arc::new(MockGenerator::replying("answer")),
        None,
        dir.path().to_path_buf(),
        VadSettings {
            enabled: true,
            ..VadSettings::default()
        },
    );

    // 1s silence, 1s tone, 1s silence
    let mut pcm = silence_pcm(1000);
    pcm.extend(sine_pcm(440.0, 1000, 0.3));
    pcm.extend(silence_pcm(1000));
    let full_len = pcm.len();

    let input = wav_input(&dir, &pcm);
    pipeline
        .process(PipelineInput::Audio(input), 1)
        .await
        .unwrap();

    let calls = transcriber.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    // Transcribed audio is meaningfully shorter than the padded input
    assert!(calls[0] < full_len);
}

#[tokio::test]
async fn vad_with_all_silence_falls_back_to_full_audio() {
    let dir = tempfile::tempdir().unwrap();
    let transcriber = Arc::new(MockTranscriber::replying("something"));
    let pipeline = Pipeline::new(
        Arc::clone(&transcriber) as Arc<dyn Transcriber>,
        None,
        Arc::new(MockGenerator::replying("answer")),
        None,
        dir.path().to_path_buf(),
        VadSettings {
            enabled: true,
            ..VadSettings::default()
        },
    );

    let pcm = silence_pcm(1000);
    let input = wav_input(&dir, &pcm);
    pipeline
        .process(PipelineInput::Audio(input), 1)
        .await
        .unwrap();

    // No voiced segments found, the untrimmed WAV was transcribed
    let calls = transcriber.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0] >= pcm.len());
}
