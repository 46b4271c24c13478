//! SmartFlow Gateway - Real-time voice chat streaming service
//!
//! This library provides the core functionality for the SmartFlow gateway:
//! - WebSocket audio streaming with per-user concurrency ceilings
//! - Stream spooling with byte and duration limits
//! - Audio normalization and voice activity segmentation
//! - A transcribe / retrieve / generate / synthesize pipeline over
//!   OpenAI-compatible APIs
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Clients                          │
//! │        WebSocket audio streams  │  /static          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               SmartFlow Gateway                      │
//! │  Gate │ Session │ Spool │ Normalize │ VAD │ Pipeline │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          OpenAI-compatible provider APIs             │
//! │        STT  │  Chat  │  TTS  │  Vector search        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod stream;
pub mod voice;

pub use api::ApiServer;
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineInput, PipelineResult, APOLOGY};
pub use stream::{ConcurrencyGate, SessionState, StreamErrorCode, StreamSession};
