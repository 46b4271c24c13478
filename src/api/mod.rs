//! HTTP API server for the SmartFlow gateway

pub mod health;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::stream::ConcurrencyGate;
use crate::voice::{
    ChatGenerator, ContextRetriever, SpeechToText, Synthesizer, TextToSpeech,
    VectorSearchRetriever,
};
use crate::{Error, Result};

/// Shared state for API handlers
pub struct ApiState {
    pub config: Config,
    pub gate: Arc<ConcurrencyGate>,
    pub pipeline: Arc<Pipeline>,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Assemble the server and its pipeline from configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured for the required STT and
    /// LLM stages, or if the media directories cannot be created.
    pub fn from_config(config: Config) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            Error::Config("DEEPINFRA_API_TOKEN or SMARTFLOW_API_KEY required".to_string())
        })?;

        std::fs::create_dir_all(config.audio_dir())?;
        std::fs::create_dir_all(config.streams_dir())?;

        let transcriber = Arc::new(SpeechToText::new(
            config.api_base.clone(),
            api_key.clone(),
            config.stt_model.clone(),
        )?);

        let generator = Arc::new(ChatGenerator::new(
            config.api_base.clone(),
            api_key.clone(),
            config.llm_model.clone(),
        )?);

        let synthesizer: Option<Arc<dyn Synthesizer>> = if config.synthesize_replies {
            Some(Arc::new(TextToSpeech::new(
                config.api_base.clone(),
                api_key,
                config.tts_model.clone(),
                config.tts_voice.clone(),
            )?))
        } else {
            None
        };

        let retriever: Option<Arc<dyn ContextRetriever>> =
            config.retrieval_url.clone().map(|url| {
                Arc::new(VectorSearchRetriever::new(
                    url,
                    config.retrieval_api_key.clone(),
                    config.retrieval_top_k,
                )) as Arc<dyn ContextRetriever>
            });

        if retriever.is_none() {
            tracing::info!("no retrieval service configured, pipeline runs contextless");
        }

        let pipeline = Arc::new(Pipeline::new(
            transcriber,
            retriever,
            generator,
            synthesizer,
            config.audio_dir(),
            config.vad,
        ));

        let gate = Arc::new(ConcurrencyGate::new(config.limits.max_streams_per_user));
        let port = config.port;

        Ok(Self {
            state: Arc::new(ApiState {
                config,
                gate,
                pipeline,
            }),
            port,
        })
    }

    /// Build the router with all routes
    fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .merge(health::router())
            .merge(websocket::router(Arc::clone(&self.state)))
            .nest_service("/static", ServeDir::new(&self.state.config.media_dir))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
