//! Voice activity segmentation
//!
//! Partitions canonical PCM (16kHz mono 16-bit) into fixed-duration frames,
//! classifies each frame as voiced or unvoiced with an RMS energy detector,
//! and groups contiguous voiced frames into utterance segments using a
//! padding ring buffer with hysteresis on both edges. Silence between
//! utterances is discarded.
//!
//! The segmenter is pure and transport-independent: construct a fresh
//! instance per waveform and pull segments through the `Iterator` interface.

use std::collections::VecDeque;

use crate::audio::{BYTES_PER_SAMPLE, SAMPLE_RATE};
use crate::config::VadSettings;

/// Fraction of the ring buffer that must agree before the trigger flips
const TRIGGER_RATIO: f32 = 0.9;

/// Energy thresholds indexed by detector aggressiveness
const ENERGY_THRESHOLDS: [f32; 4] = [0.010, 0.020, 0.030, 0.050];

/// A contiguous span of voiced audio
///
/// Carries raw PCM bytes only; position within the source waveform is
/// implied by emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Concatenated PCM of the voiced frames (plus hysteresis padding)
    pub pcm: Vec<u8>,
}

/// A fixed-duration frame of PCM audio
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Raw PCM payload of exactly one frame duration
    pub payload: &'a [u8],

    /// Offset of this frame from the start of the waveform, in seconds
    pub timestamp: f64,
}

/// Lazy frame iterator over a PCM waveform
///
/// The final partial frame (shorter than one full frame) is dropped.
struct Frames<'a> {
    pcm: &'a [u8],
    frame_len: usize,
    offset: usize,
    step_secs: f64,
    timestamp: f64,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Frame<'a>;

    fn next(&mut self) -> Option<Frame<'a>> {
        if self.offset + self.frame_len > self.pcm.len() {
            return None;
        }
        let frame = Frame {
            payload: &self.pcm[self.offset..self.offset + self.frame_len],
            timestamp: self.timestamp,
        };
        self.offset += self.frame_len;
        self.timestamp += self.step_secs;
        Some(frame)
    }
}

/// Groups voiced frames into utterance segments
///
/// State machine with two phases: while *not triggered* it searches for
/// speech onset, holding recent frames in the padding ring buffer; once more
/// than 90% of the ring is voiced it flips to *triggered*, flushes the ring
/// into the open segment, and appends every further frame until more than
/// 90% of the ring is unvoiced, at which point the segment is emitted.
/// Any segment still open at end of input is flushed as a final segment.
pub struct VadSegmenter<'a> {
    frames: Frames<'a>,
    ring: VecDeque<(&'a [u8], bool)>,
    ring_capacity: usize,
    threshold: f32,
    triggered: bool,
    voiced: Vec<u8>,
}

impl<'a> VadSegmenter<'a> {
    /// Create a segmenter over `pcm` (16kHz mono 16-bit little-endian)
    #[must_use]
    pub fn new(pcm: &'a [u8], settings: &VadSettings) -> Self {
        let frame_len = frame_byte_len(settings.frame_duration_ms);
        let ring_capacity =
            (settings.padding_duration_ms / settings.frame_duration_ms).max(1) as usize;
        let threshold = ENERGY_THRESHOLDS[usize::from(settings.aggressiveness.min(3))];

        Self {
            frames: Frames {
                pcm,
                frame_len,
                offset: 0,
                step_secs: f64::from(settings.frame_duration_ms) / 1000.0,
                timestamp: 0.0,
            },
            ring: VecDeque::with_capacity(ring_capacity),
            ring_capacity,
            threshold,
            triggered: false,
            voiced: Vec::new(),
        }
    }

    fn push_ring(&mut self, payload: &'a [u8], is_speech: bool) {
        if self.ring.len() == self.ring_capacity {
            self.ring.pop_front();
        }
        self.ring.push_back((payload, is_speech));
    }

    /// The `> 90%` test uses the configured capacity as denominator, so a
    /// warming-up ring rarely flips the trigger.
    #[allow(clippy::cast_precision_loss)]
    fn past_trigger_ratio(&self, count: usize) -> bool {
        count as f32 > TRIGGER_RATIO * self.ring_capacity as f32
    }
}

impl Iterator for VadSegmenter<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        while let Some(frame) = self.frames.next() {
            let is_speech = rms_energy(frame.payload) > self.threshold;

            if self.triggered {
                self.voiced.extend_from_slice(frame.payload);
                self.push_ring(frame.payload, is_speech);

                let num_unvoiced = self.ring.iter().filter(|(_, s)| !s).count();
                if self.past_trigger_ratio(num_unvoiced) {
                    self.triggered = false;
                    self.ring.clear();
                    return Some(Segment {
                        pcm: std::mem::take(&mut self.voiced),
                    });
                }
            } else {
                self.push_ring(frame.payload, is_speech);

                let num_voiced = self.ring.iter().filter(|(_, s)| *s).count();
                if self.past_trigger_ratio(num_voiced) {
                    self.triggered = true;
                    for (payload, _) in self.ring.drain(..) {
                        self.voiced.extend_from_slice(payload);
                    }
                }
            }
        }

        // Flush a still-open segment at end of input
        if self.voiced.is_empty() {
            None
        } else {
            Some(Segment {
                pcm: std::mem::take(&mut self.voiced),
            })
        }
    }
}

/// Byte length of one analysis frame at the canonical sample rate
#[must_use]
pub fn frame_byte_len(frame_duration_ms: u32) -> usize {
    SAMPLE_RATE as usize * frame_duration_ms as usize / 1000 * BYTES_PER_SAMPLE
}

/// RMS energy of a 16-bit little-endian PCM frame, normalized to [0, 1]
#[allow(clippy::cast_precision_loss)]
fn rms_energy(payload: &[u8]) -> f32 {
    if payload.len() < BYTES_PER_SAMPLE {
        return 0.0;
    }
    let mut sum_squares = 0.0f32;
    let mut count = 0usize;
    for sample in payload.chunks_exact(BYTES_PER_SAMPLE) {
        let value = f32::from(i16::from_le_bytes([sample[0], sample[1]])) / 32768.0;
        sum_squares += value * value;
        count += 1;
    }
    (sum_squares / count as f32).sqrt()
}
