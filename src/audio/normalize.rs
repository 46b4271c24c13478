//! Audio format normalization
//!
//! Streamed audio arrives in whatever container the client recorded
//! (webm/opus from browsers, mp3, wav). Transcription and VAD both want
//! canonical 16kHz mono 16-bit PCM WAV, so every buffered artifact goes
//! through [`normalize_to_wav`] before processing.
//!
//! ffmpeg handles the widest range of containers and is used when present
//! on PATH; without it we fall back to in-process decoding, which covers
//! WAV and MP3 inputs only.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::audio::SAMPLE_RATE;
use crate::{Error, Result};

/// Convert an audio file to canonical 16kHz mono WAV
///
/// Writes the result next to the input with a `.norm.wav` suffix and
/// returns its path. The input file is left in place.
///
/// # Errors
///
/// Returns [`Error::Audio`] if neither ffmpeg nor the in-process decoders
/// can handle the input format.
pub async fn normalize_to_wav(input: &Path) -> Result<PathBuf> {
    let output = normalized_path(input);

    if which::which("ffmpeg").is_ok() {
        match ffmpeg_convert(input, &output).await {
            Ok(()) => return Ok(output),
            Err(e) => {
                tracing::warn!(
                    input = %input.display(),
                    error = %e,
                    "ffmpeg conversion failed, trying in-process decode"
                );
            }
        }
    } else {
        tracing::debug!("ffmpeg not found on PATH, using in-process decode");
    }

    let data = tokio::fs::read(input).await?;
    let wav = decode_to_wav(&data)?;
    tokio::fs::write(&output, wav).await?;
    Ok(output)
}

/// Path of the normalized sibling for a spool file
#[must_use]
pub fn normalized_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "stream".to_string(), |s| s.to_string_lossy().to_string());
    input.with_file_name(format!("{stem}.norm.wav"))
}

async fn ffmpeg_convert(input: &Path, output: &Path) -> Result<()> {
    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(input)
        .arg("-ar")
        .arg(SAMPLE_RATE.to_string())
        .arg("-ac")
        .arg("1")
        .arg(output)
        .output()
        .await?;

    if result.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&result.stderr);
        Err(Error::Audio(format!(
            "ffmpeg exited with {}: {}",
            result.status,
            stderr.lines().last().unwrap_or_default()
        )))
    }
}

/// Decode WAV or MP3 bytes and re-encode as canonical WAV
fn decode_to_wav(data: &[u8]) -> Result<Vec<u8>> {
    let (samples, sample_rate) = if data.starts_with(b"RIFF") {
        decode_wav(data)?
    } else {
        decode_mp3(data)?
    };

    let resampled = if sample_rate == SAMPLE_RATE {
        samples
    } else {
        resample(&samples, sample_rate, SAMPLE_RATE)?
    };

    samples_to_wav(&resampled, SAMPLE_RATE)
}

/// Decode WAV bytes to mono f32 samples
fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = f32::from(i16::MAX);
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| f32::from(v) / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
    };

    let mono = downmix(&interleaved, channels);
    Ok((mono, spec.sample_rate))
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                {
                    sample_rate = frame.sample_rate as u32;
                }
                if frame.channels == 2 {
                    for chunk in frame.data.chunks(2) {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        samples.push(f32::midpoint(left, right));
                    }
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(Error::Audio("unrecognized audio format".to_string()));
    }
    Ok((samples, sample_rate))
}

/// Average interleaved channels down to mono
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    #[allow(clippy::cast_precision_loss)]
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio using rubato
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::new();

    for chunk in input.chunks(chunk_size) {
        // Trailing partial chunk is padded with silence
        let mut frame = chunk.to_vec();
        frame.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[frame], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    Ok(output.iter().map(|&s| s as f32).collect())
}

/// Encode mono f32 samples as 16-bit WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Wrap raw 16kHz mono 16-bit PCM bytes in a WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Extract raw PCM bytes from a canonical WAV file
///
/// # Errors
///
/// Returns error if the file is not readable 16-bit WAV
pub fn wav_to_pcm(path: &Path) -> Result<Vec<u8>> {
    let mut reader = hound::WavReader::open(path).map_err(|e| Error::Audio(e.to_string()))?;
    let mut pcm = Vec::new();
    for sample in reader.samples::<i16>() {
        let value = sample.map_err(|e| Error::Audio(e.to_string()))?;
        pcm.extend_from_slice(&value.to_le_bytes());
    }
    Ok(pcm)
}
