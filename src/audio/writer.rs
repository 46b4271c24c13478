//! Stream spool writer with byte and duration ceilings
//!
//! Each streaming session owns one `StreamWriter` that appends inbound audio
//! chunks to a spool file. Writes are atomic per chunk and the writer refuses
//! further data once the configured byte or wall-clock ceiling is reached;
//! both conditions are terminal for the session, not retryable.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::StreamLimits;

/// Errors surfaced by [`StreamWriter::write`]
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// Cumulative bytes would exceed the per-stream ceiling
    #[error("stream exceeds byte ceiling of {limit} bytes")]
    TooLarge {
        /// Configured byte ceiling
        limit: u64,
    },

    /// Wall-clock time since stream start exceeded the ceiling
    #[error("stream exceeds duration ceiling of {limit:?}")]
    Timeout {
        /// Configured duration ceiling
        limit: Duration,
    },

    /// Underlying filesystem failure
    #[error("spool io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only spool for one streaming session
pub struct StreamWriter {
    file: File,
    path: PathBuf,
    bytes_written: u64,
    started: Instant,
    max_bytes: u64,
    max_duration: Duration,
    finished: bool,
}

impl StreamWriter {
    /// Create a spool file in `dir` for a new session
    ///
    /// # Errors
    ///
    /// Returns error if the directory or spool file cannot be created.
    pub fn create(dir: &Path, limits: &StreamLimits) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.webm", Uuid::new_v4()));
        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;

        Ok(Self {
            file,
            path,
            bytes_written: 0,
            started: Instant::now(),
            max_bytes: limits.max_stream_bytes,
            max_duration: Duration::from_secs(limits.max_stream_secs),
            finished: false,
        })
    }

    /// Append one chunk to the spool
    ///
    /// The chunk is written in full or not at all; a rejected chunk leaves
    /// the spool exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Timeout`] once the session has outlived its
    /// duration ceiling, [`WriteError::TooLarge`] when the chunk would push
    /// the spool past its byte ceiling, or [`WriteError::Io`] on filesystem
    /// failure.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), WriteError> {
        if self.started.elapsed() > self.max_duration {
            return Err(WriteError::Timeout {
                limit: self.max_duration,
            });
        }
        if self.bytes_written + chunk.len() as u64 > self.max_bytes {
            return Err(WriteError::TooLarge {
                limit: self.max_bytes,
            });
        }

        self.file.write_all(chunk)?;
        self.file.flush()?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Total bytes accepted so far
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether any audio has been buffered
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes_written == 0
    }

    /// Time since the session started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Path of the backing spool file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the spool and hand the artifact to processing
    ///
    /// After `finish` the caller owns the file; dropping the writer no
    /// longer removes it.
    #[must_use]
    pub fn finish(mut self) -> PathBuf {
        self.finished = true;
        self.path.clone()
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        // Sessions that never reach processing must not leak spool files
        if !self.finished {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::debug!(path = %self.path.display(), error = %e, "spool cleanup failed");
            }
        }
    }
}
