//! WebSocket handler for real-time voice streaming
//!
//! Protocol: the client connects to `GET /ws/stream`, sends binary audio
//! chunks, and ends the stream with a `{"event":"stop"}` text message or by
//! disconnecting. Each accepted chunk is acknowledged with `{"ack":true}`.
//! The buffered audio then runs through the pipeline and the final result
//! is delivered as one JSON message.
//!
//! Errors are reported as `{"error":"<code>"}` messages; authentication and
//! concurrency rejections additionally close the socket with application
//! close codes 4401 and 4409.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::time::Instant;

use super::ApiState;
use crate::pipeline::PipelineInput;
use crate::stream::{
    ControlEvent, FinalizeOutcome, SessionEvent, StreamErrorCode, StreamSession,
};

/// Close code for failed authentication
const CLOSE_UNAUTHORIZED: u16 = 4401;

/// Close code for the per-user stream ceiling
const CLOSE_TOO_MANY_STREAMS: u16 = 4409;

/// Optional query parameters for the stream endpoint
#[derive(Debug, Deserialize)]
struct WsQuery {
    user_id: Option<String>,
    token: Option<String>,
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ws/stream", get(ws_upgrade))
        .with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Token from query string, falling back to the Authorization header
    // with an optional Bearer prefix
    let token = query.token.or_else(|| {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).to_string())
    });

    // Unparseable or absent identity falls back to the anonymous user
    let user_id = query
        .user_id
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, token))
}

/// Handle one streaming session over a WebSocket connection
async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<ApiState>,
    user_id: u64,
    token: Option<String>,
) {
    if let Some(expected) = &state.config.ws_auth_token {
        if token.as_deref() != Some(expected.as_str()) {
            tracing::warn!(user_id, "rejecting stream with invalid token");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_UNAUTHORIZED,
                    reason: "unauthorized".into(),
                })))
                .await;
            return;
        }
    }

    let Some(_slot) = state.gate.try_acquire(user_id) else {
        send_error(&mut socket, StreamErrorCode::TooManyStreams, None).await;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_TOO_MANY_STREAMS,
                reason: "too many streams".into(),
            })))
            .await;
        return;
    };

    let mut session =
        match StreamSession::begin(&state.config.streams_dir(), &state.config.limits) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(user_id, error = %e, "failed to start stream session");
                send_error(&mut socket, StreamErrorCode::ServerError, Some(&e.to_string())).await;
                return;
            }
        };

    tracing::info!(user_id, "stream session started");

    let deadline =
        Instant::now() + Duration::from_secs(state.config.limits.max_stream_secs);

    // Receive loop: ends on stop, disconnect, ceiling breach, or deadline
    loop {
        let msg = match tokio::time::timeout_at(deadline, socket.recv()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(user_id, error = %e, "socket error, finalizing");
                session.on_disconnect();
                break;
            }
            Ok(None) => {
                session.on_disconnect();
                break;
            }
            Err(_) => {
                // Deadline force-finalizes; buffered audio is still processed
                tracing::warn!(user_id, "stream deadline reached");
                session.on_disconnect();
                send_error(&mut socket, StreamErrorCode::Timeout, None).await;
                break;
            }
        };

        match msg {
            Message::Binary(data) => match session.on_chunk(&data) {
                Ok(SessionEvent::Ack) => {
                    let _ = socket.send(Message::Text(r#"{"ack":true}"#.into())).await;
                }
                Ok(SessionEvent::Discarded) => {}
                Ok(SessionEvent::LimitReached(code)) => {
                    send_error(&mut socket, code, None).await;
                    break;
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "spool write failed");
                    send_error(&mut socket, StreamErrorCode::ServerError, Some(&e.to_string()))
                        .await;
                    break;
                }
            },
            Message::Text(text) => {
                if session.on_control(&text) == ControlEvent::Stop {
                    break;
                }
            }
            Message::Close(_) => {
                session.on_disconnect();
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let was_aborted = session.state() == crate::stream::SessionState::Aborted;
    match session.finalize() {
        FinalizeOutcome::Empty => {
            // Abort paths above already reported their own error code
            if !was_aborted {
                send_error(&mut socket, StreamErrorCode::EmptyStream, None).await;
            }
            tracing::info!(user_id, "stream ended without audio");
        }
        FinalizeOutcome::Process { path, bytes } => {
            tracing::info!(user_id, bytes, spool = %path.display(), "processing stream");

            let result = state
                .pipeline
                .process(PipelineInput::Audio(path.clone()), user_id)
                .await;

            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::debug!(path = %path.display(), error = %e, "spool cleanup failed");
            }

            match result {
                Ok(result) => {
                    session.complete();
                    match serde_json::to_string(&result) {
                        Ok(json) => {
                            let _ = socket.send(Message::Text(json.into())).await;
                        }
                        Err(e) => {
                            tracing::error!(user_id, error = %e, "result serialization failed");
                            send_error(
                                &mut socket,
                                StreamErrorCode::ServerError,
                                Some(&e.to_string()),
                            )
                            .await;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(user_id, error = %e, "pipeline failed");
                    session.abort();
                    send_error(&mut socket, StreamErrorCode::ServerError, Some(&e.to_string()))
                        .await;
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    tracing::info!(user_id, state = ?session.state(), "stream session ended");
}

/// Send a protocol error message, best-effort
async fn send_error(socket: &mut WebSocket, code: StreamErrorCode, detail: Option<&str>) {
    let body = detail.map_or_else(
        || serde_json::json!({ "error": code.as_str() }),
        |detail| serde_json::json!({ "error": code.as_str(), "detail": detail }),
    );
    if let Ok(json) = serde_json::to_string(&body) {
        let _ = socket.send(Message::Text(json.into())).await;
    }
}
