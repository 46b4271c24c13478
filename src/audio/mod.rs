//! Audio handling: stream spooling, format normalization, voice activity segmentation

pub mod normalize;
pub mod vad;
pub mod writer;

pub use normalize::normalize_to_wav;
pub use vad::{Segment, VadSegmenter};
pub use writer::{StreamWriter, WriteError};

/// Canonical sample rate for transcription and VAD (16kHz speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Canonical sample width in bytes (16-bit PCM)
pub const BYTES_PER_SAMPLE: usize = 2;
