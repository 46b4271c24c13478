//! Voice activity segmentation integration tests

use smartflow_gateway::audio::vad::{frame_byte_len, VadSegmenter};
use smartflow_gateway::config::VadSettings;

mod common;
use common::{silence_pcm, sine_pcm};

fn settings() -> VadSettings {
    VadSettings {
        enabled: true,
        frame_duration_ms: 30,
        padding_duration_ms: 300,
        aggressiveness: 2,
    }
}

fn ms_bytes(ms: u32) -> usize {
    frame_byte_len(30) * (ms / 30) as usize
}

#[test]
fn isolated_utterance_yields_one_segment() {
    let mut pcm = silence_pcm(600);
    pcm.extend(sine_pcm(440.0, 900, 0.3));
    pcm.extend(silence_pcm(600));

    let segments: Vec<_> = VadSegmenter::new(&pcm, &settings()).collect();
    assert_eq!(segments.len(), 1);

    // Segment covers the voiced region plus at most the hysteresis padding
    let voiced = ms_bytes(900);
    let padding = ms_bytes(300);
    let len = segments[0].pcm.len();
    assert!(len >= voiced, "segment shorter than voiced region: {len}");
    assert!(
        len <= voiced + padding + frame_byte_len(30),
        "segment overlong: {len}"
    );
}

#[test]
fn all_silence_yields_no_segments() {
    let pcm = silence_pcm(2000);
    assert_eq!(VadSegmenter::new(&pcm, &settings()).count(), 0);
}

#[test]
fn fully_voiced_audio_flushes_one_segment_at_eof() {
    let pcm = sine_pcm(440.0, 900, 0.3);
    let segments: Vec<_> = VadSegmenter::new(&pcm, &settings()).collect();
    assert_eq!(segments.len(), 1);
    // EOF flush keeps every full frame of the voiced input
    assert_eq!(segments[0].pcm.len(), ms_bytes(900));
}

#[test]
fn separated_utterances_yield_separate_segments() {
    let mut pcm = silence_pcm(600);
    pcm.extend(sine_pcm(440.0, 900, 0.3));
    pcm.extend(silence_pcm(900));
    pcm.extend(sine_pcm(300.0, 900, 0.3));
    pcm.extend(silence_pcm(600));

    let segments: Vec<_> = VadSegmenter::new(&pcm, &settings()).collect();
    assert_eq!(segments.len(), 2);
}

#[test]
fn segment_bytes_are_frame_aligned() {
    let mut pcm = silence_pcm(600);
    pcm.extend(sine_pcm(440.0, 900, 0.3));
    pcm.extend(silence_pcm(600));

    for segment in VadSegmenter::new(&pcm, &settings()) {
        assert_eq!(segment.pcm.len() % frame_byte_len(30), 0);
    }
}

#[test]
fn quiet_audio_is_ignored_at_higher_aggressiveness() {
    // Amplitude below the strictest threshold but above the most permissive
    let mut pcm = silence_pcm(600);
    pcm.extend(sine_pcm(440.0, 900, 0.04));
    pcm.extend(silence_pcm(600));

    let strict = VadSettings {
        aggressiveness: 3,
        ..settings()
    };
    let permissive = VadSettings {
        aggressiveness: 0,
        ..settings()
    };

    assert_eq!(VadSegmenter::new(&pcm, &strict).count(), 0);
    assert_eq!(VadSegmenter::new(&pcm, &permissive).count(), 1);
}
