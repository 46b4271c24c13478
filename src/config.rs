//! Configuration management for the SmartFlow gateway
//!
//! Configuration is resolved in priority order: environment variables, then
//! an optional `smartflow.toml` in the platform config directory, then
//! built-in defaults.

use std::env;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::{Error, Result};

/// Default OpenAI-compatible API base URL for STT/LLM/TTS
pub const DEFAULT_API_BASE: &str = "https://api.deepinfra.com/v1/openai";

/// SmartFlow gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,

    /// Directory for stored media (stream spools, synthesized replies)
    pub media_dir: PathBuf,

    /// Shared-secret token for WebSocket streams.
    /// When set, clients must present it as `?token=` or `Authorization` header.
    pub ws_auth_token: Option<String>,

    /// OpenAI-compatible API base URL
    pub api_base: String,

    /// API key for the STT/LLM/TTS provider
    pub api_key: Option<String>,

    /// STT model identifier
    pub stt_model: String,

    /// LLM model identifier for chat completions
    pub llm_model: String,

    /// TTS model identifier
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// Synthesize spoken replies for streamed requests
    pub synthesize_replies: bool,

    /// Vector-search service endpoint for conversational context.
    /// Absent means retrieval is disabled and the pipeline runs contextless.
    pub retrieval_url: Option<String>,

    /// API key for the vector-search service
    pub retrieval_api_key: Option<String>,

    /// Number of context snippets to request per query
    pub retrieval_top_k: usize,

    /// Per-session resource ceilings
    pub limits: StreamLimits,

    /// Voice activity segmentation settings
    pub vad: VadSettings,
}

/// Resource ceilings for streaming sessions
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StreamLimits {
    /// Maximum concurrent streams per user
    pub max_streams_per_user: usize,

    /// Maximum bytes buffered per stream
    pub max_stream_bytes: u64,

    /// Maximum wall-clock stream duration in seconds
    pub max_stream_secs: u64,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_streams_per_user: 2,
            max_stream_bytes: 50 * 1024 * 1024,
            max_stream_secs: 300,
        }
    }
}

/// Voice activity segmentation settings
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct VadSettings {
    /// Trim silence from streamed audio before transcription
    pub enabled: bool,

    /// Analysis frame duration in milliseconds
    pub frame_duration_ms: u32,

    /// Hysteresis padding window in milliseconds
    pub padding_duration_ms: u32,

    /// Detector aggressiveness (0 = permissive, 3 = strict)
    pub aggressiveness: u8,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frame_duration_ms: 30,
            padding_duration_ms: 300,
            aggressiveness: 2,
        }
    }
}

/// Optional overrides read from `smartflow.toml`
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    port: Option<u16>,
    media_dir: Option<PathBuf>,
    api_base: Option<String>,
    stt_model: Option<String>,
    llm_model: Option<String>,
    tts_model: Option<String>,
    tts_voice: Option<String>,
    synthesize_replies: Option<bool>,
    retrieval_url: Option<String>,
    retrieval_top_k: Option<usize>,
    limits: Option<StreamLimits>,
    vad: Option<VadSettings>,
}

impl Config {
    /// Load configuration from the environment and optional config file
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed, or if
    /// a numeric environment variable is malformed.
    pub fn load() -> Result<Self> {
        let file = Self::load_file()?;
        let limits = file.limits.unwrap_or_default();
        let vad = file.vad.unwrap_or_default();

        let mut config = Self {
            port: file.port.unwrap_or(8787),
            media_dir: file.media_dir.unwrap_or_else(default_media_dir),
            ws_auth_token: env_non_empty("WS_AUTH_TOKEN"),
            api_base: file
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: env_non_empty("DEEPINFRA_API_TOKEN")
                .or_else(|| env_non_empty("SMARTFLOW_API_KEY")),
            stt_model: file
                .stt_model
                .unwrap_or_else(|| "mistralai/Voxtral-Small-24B-2507".to_string()),
            llm_model: file
                .llm_model
                .unwrap_or_else(|| "openai/gpt-oss-120b".to_string()),
            tts_model: file
                .tts_model
                .unwrap_or_else(|| "hexgrad/Kokoro-82M".to_string()),
            tts_voice: file.tts_voice.unwrap_or_else(|| "af_bella".to_string()),
            synthesize_replies: file.synthesize_replies.unwrap_or(true),
            retrieval_url: file
                .retrieval_url
                .or_else(|| env_non_empty("SMARTFLOW_RETRIEVAL_URL")),
            retrieval_api_key: env_non_empty("SMARTFLOW_RETRIEVAL_API_KEY"),
            retrieval_top_k: file.retrieval_top_k.unwrap_or(5),
            limits,
            vad,
        };

        // Environment overrides for deployment platforms
        if let Some(port) = env_non_empty("SMARTFLOW_PORT").or_else(|| env_non_empty("PORT")) {
            config.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid port: {port}")))?;
        }
        if let Some(dir) = env_non_empty("SMARTFLOW_MEDIA_DIR") {
            config.media_dir = PathBuf::from(dir);
        }
        if let Some(base) = env_non_empty("SMARTFLOW_API_BASE") {
            config.api_base = base;
        }
        if let Some(max) = env_non_empty("SMARTFLOW_MAX_STREAMS_PER_USER") {
            config.limits.max_streams_per_user = max
                .parse()
                .map_err(|_| Error::Config(format!("invalid stream ceiling: {max}")))?;
        }
        if let Some(max) = env_non_empty("SMARTFLOW_MAX_STREAM_BYTES") {
            config.limits.max_stream_bytes = max
                .parse()
                .map_err(|_| Error::Config(format!("invalid byte ceiling: {max}")))?;
        }
        if let Some(max) = env_non_empty("SMARTFLOW_MAX_STREAM_SECS") {
            config.limits.max_stream_secs = max
                .parse()
                .map_err(|_| Error::Config(format!("invalid duration ceiling: {max}")))?;
        }

        Ok(config)
    }

    /// Directory where synthesized reply audio is written
    #[must_use]
    pub fn audio_dir(&self) -> PathBuf {
        self.media_dir.join("audio")
    }

    /// Directory where stream spool files are written
    #[must_use]
    pub fn streams_dir(&self) -> PathBuf {
        self.media_dir.join("audio").join("streams")
    }

    fn load_file() -> Result<FileConfig> {
        let Some(dirs) = ProjectDirs::from("", "", "smartflow") else {
            return Ok(FileConfig::default());
        };
        let path = dirs.config_dir().join("smartflow.toml");
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let parsed = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(parsed)
    }
}

/// Read an environment variable, treating empty values as unset
fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn default_media_dir() -> PathBuf {
    ProjectDirs::from("", "", "smartflow").map_or_else(
        || PathBuf::from("assets"),
        |dirs| dirs.data_dir().join("assets"),
    )
}
