//! Streaming session state machine
//!
//! One `StreamSession` exists per WebSocket stream. It owns the spool
//! writer and tracks the session through its lifecycle:
//!
//! `Receiving` -> `Finalizing` (stop event, disconnect, or ceiling breach)
//! -> `Processing` (non-empty buffer handed to the pipeline) or `Aborted`
//! (empty buffer or unrecoverable error). A ceiling breach stops intake but
//! audio buffered before the breach is still processed. `Completed` is
//! recorded once a final result was delivered. Transitions are one-way;
//! chunks arriving after finalization begins are discarded.

use std::path::{Path, PathBuf};

use crate::audio::writer::{StreamWriter, WriteError};
use crate::config::StreamLimits;
use crate::{Error, Result};

/// Lifecycle phase of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting audio chunks
    Receiving,
    /// Stop received or peer disconnected, no further audio accepted
    Finalizing,
    /// Buffered audio handed to the pipeline
    Processing,
    /// Final result delivered
    Completed,
    /// Terminated without producing a result
    Aborted,
}

/// Protocol-level error codes sent to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorCode {
    /// User is at the concurrent stream ceiling
    TooManyStreams,
    /// Stream outlived the duration ceiling
    Timeout,
    /// Stream exceeded the byte ceiling
    TooLarge,
    /// Stream ended with no buffered audio
    EmptyStream,
    /// Internal failure during processing
    ServerError,
}

impl StreamErrorCode {
    /// Wire representation of the error code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TooManyStreams => "too_many_streams",
            Self::Timeout => "timeout",
            Self::TooLarge => "too_large",
            Self::EmptyStream => "empty_stream",
            Self::ServerError => "server_error",
        }
    }
}

/// Outcome of feeding one audio chunk into the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Chunk buffered, acknowledge to the client
    Ack,
    /// Chunk discarded because the session is no longer receiving
    Discarded,
    /// A resource ceiling was breached, session moves to finalization
    LimitReached(StreamErrorCode),
}

/// Outcome of a client text message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Client requested finalization
    Stop,
    /// Unrecognized message, ignored
    Ignored,
}

/// Result of finalizing a session
#[derive(Debug)]
pub enum FinalizeOutcome {
    /// No audio was buffered
    Empty,
    /// Buffered artifact ready for the pipeline
    Process {
        /// Spool file owned by the caller from here on
        path: PathBuf,
        /// Total buffered bytes
        bytes: u64,
    },
}

/// One WebSocket streaming session
pub struct StreamSession {
    writer: Option<StreamWriter>,
    state: SessionState,
}

impl StreamSession {
    /// Start a session spooling into `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the spool file cannot be created.
    pub fn begin(dir: &Path, limits: &StreamLimits) -> Result<Self> {
        Ok(Self {
            writer: Some(StreamWriter::create(dir, limits)?),
            state: SessionState::Receiving,
        })
    }

    /// Current lifecycle phase
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Total bytes buffered so far
    #[must_use]
    pub fn bytes_buffered(&self) -> u64 {
        self.writer.as_ref().map_or(0, StreamWriter::bytes_written)
    }

    /// Feed one binary audio chunk into the session
    ///
    /// # Errors
    ///
    /// Returns error only on filesystem failure; ceiling breaches are
    /// reported through [`SessionEvent::LimitReached`].
    pub fn on_chunk(&mut self, chunk: &[u8]) -> Result<SessionEvent> {
        if self.state != SessionState::Receiving {
            return Ok(SessionEvent::Discarded);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(SessionEvent::Discarded);
        };

        // Ceiling breaches force finalization, not abort: whatever was
        // buffered before the breach is still processed.
        match writer.write(chunk) {
            Ok(()) => Ok(SessionEvent::Ack),
            Err(WriteError::TooLarge { limit }) => {
                tracing::warn!(limit, buffered = writer.bytes_written(), "byte ceiling hit");
                self.state = SessionState::Finalizing;
                Ok(SessionEvent::LimitReached(StreamErrorCode::TooLarge))
            }
            Err(WriteError::Timeout { limit }) => {
                tracing::warn!(limit_secs = limit.as_secs(), "duration ceiling hit");
                self.state = SessionState::Finalizing;
                Ok(SessionEvent::LimitReached(StreamErrorCode::Timeout))
            }
            Err(WriteError::Io(e)) => {
                self.abort();
                Err(Error::Io(e))
            }
        }
    }

    /// Interpret a client text message
    pub fn on_control(&mut self, text: &str) -> ControlEvent {
        let event = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(String::from));

        match event.as_deref() {
            Some("stop") => {
                if self.state == SessionState::Receiving {
                    self.state = SessionState::Finalizing;
                }
                ControlEvent::Stop
            }
            other => {
                tracing::debug!(event = ?other, "ignoring control message");
                ControlEvent::Ignored
            }
        }
    }

    /// Peer disconnected without an explicit stop
    ///
    /// Treated the same as a stop: buffered audio is still processed.
    pub fn on_disconnect(&mut self) {
        if self.state == SessionState::Receiving {
            self.state = SessionState::Finalizing;
        }
    }

    /// Terminate the session without processing, removing the spool
    pub fn abort(&mut self) {
        self.state = SessionState::Aborted;
        // Dropping an unfinished writer removes its spool file
        self.writer = None;
    }

    /// Mark the pipeline result as delivered
    pub fn complete(&mut self) {
        self.state = SessionState::Completed;
    }

    /// Hand the buffered artifact to processing
    ///
    /// Empty sessions yield [`FinalizeOutcome::Empty`] and are aborted; the
    /// spool is removed either way once no audio survives.
    pub fn finalize(&mut self) -> FinalizeOutcome {
        let Some(writer) = self.writer.take() else {
            self.state = SessionState::Aborted;
            return FinalizeOutcome::Empty;
        };

        if writer.is_empty() {
            self.state = SessionState::Aborted;
            return FinalizeOutcome::Empty;
        }

        let bytes = writer.bytes_written();
        let path = writer.finish();
        self.state = SessionState::Processing;
        FinalizeOutcome::Process { path, bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> StreamLimits {
        StreamLimits {
            max_streams_per_user: 2,
            max_stream_bytes: 64,
            max_stream_secs: 300,
        }
    }

    #[test]
    fn chunks_then_stop_yields_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = StreamSession::begin(dir.path(), &limits()).unwrap();

        assert_eq!(session.on_chunk(b"hello ").unwrap(), SessionEvent::Ack);
        assert_eq!(session.on_chunk(b"world").unwrap(), SessionEvent::Ack);
        assert_eq!(session.on_control(r#"{"event":"stop"}"#), ControlEvent::Stop);
        assert_eq!(session.state(), SessionState::Finalizing);

        match session.finalize() {
            FinalizeOutcome::Process { path, bytes } => {
                assert_eq!(bytes, 11);
                assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
            }
            FinalizeOutcome::Empty => panic!("expected artifact"),
        }
        assert_eq!(session.state(), SessionState::Processing);
    }

    #[test]
    fn empty_session_finalizes_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = StreamSession::begin(dir.path(), &limits()).unwrap();

        session.on_disconnect();
        assert!(matches!(session.finalize(), FinalizeOutcome::Empty));
        assert_eq!(session.state(), SessionState::Aborted);
    }

    #[test]
    fn byte_ceiling_forces_finalization_keeping_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = StreamSession::begin(dir.path(), &limits()).unwrap();

        assert_eq!(session.on_chunk(&[0u8; 60]).unwrap(), SessionEvent::Ack);
        assert_eq!(
            session.on_chunk(&[0u8; 10]).unwrap(),
            SessionEvent::LimitReached(StreamErrorCode::TooLarge)
        );
        assert_eq!(session.state(), SessionState::Finalizing);

        // Intake stops, but audio buffered before the breach is processed
        assert_eq!(session.on_chunk(b"late").unwrap(), SessionEvent::Discarded);
        assert!(matches!(
            session.finalize(),
            FinalizeOutcome::Process { bytes: 60, .. }
        ));
    }

    #[test]
    fn chunks_after_stop_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = StreamSession::begin(dir.path(), &limits()).unwrap();

        session.on_chunk(b"audio").unwrap();
        session.on_control(r#"{"event":"stop"}"#);
        assert_eq!(session.on_chunk(b"more").unwrap(), SessionEvent::Discarded);
        assert_eq!(session.bytes_buffered(), 5);
    }

    #[test]
    fn unknown_control_messages_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = StreamSession::begin(dir.path(), &limits()).unwrap();

        assert_eq!(
            session.on_control(r#"{"event":"pause"}"#),
            ControlEvent::Ignored
        );
        assert_eq!(session.on_control("not json"), ControlEvent::Ignored);
        assert_eq!(session.state(), SessionState::Receiving);
    }

    #[test]
    fn error_codes_match_wire_strings() {
        assert_eq!(StreamErrorCode::TooManyStreams.as_str(), "too_many_streams");
        assert_eq!(StreamErrorCode::Timeout.as_str(), "timeout");
        assert_eq!(StreamErrorCode::TooLarge.as_str(), "too_large");
        assert_eq!(StreamErrorCode::EmptyStream.as_str(), "empty_stream");
        assert_eq!(StreamErrorCode::ServerError.as_str(), "server_error");
    }
}
