//! WebSocket upgrade handler

use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{SessionHandle, SessionInput, SessionRunner};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Outbound messages buffered per connection
const OUTBOUND_QUEUE: usize = 256;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Player to attribute sessions to, may also be bound later
    pub steam64: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.steam64, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, steam64: Option<String>, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let history = state.history_for_connection();
    let bind_error = steam64
        .as_deref()
        .and_then(|raw| history.bind_player(raw).err());

    // Send welcome message
    let welcome = ServerMsg::Welcome {
        session_id,
        server_time: unix_millis(),
        steam64: history.bound_player().map(|id| id.to_string()),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome");
        return;
    }

    if let Some(e) = bind_error {
        warn!(session_id = %session_id, "Rejected steam64 on connect");
        let msg = ServerMsg::Error {
            code: "invalid_steam64".to_string(),
            message: e.to_string(),
        };
        if send_msg(&mut ws_sink, &msg).await.is_err() {
            return;
        }
    }

    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(OUTBOUND_QUEUE);
    let (runner, handle) = SessionRunner::new(session_id, rand::random(), history, out_tx);
    state.session_registry.insert(handle.clone());
    let runner_handle = tokio::spawn(runner.run());

    // Spawn writer task: runner output -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    read_inputs(session_id, ws_stream, &handle).await;

    // Dropping the last input sender stops the runner
    state.session_registry.remove(&session_id);
    drop(handle);
    if let Err(e) = runner_handle.await {
        error!(session_id = %session_id, error = %e, "Session runner panicked");
    }
    writer_handle.abort();

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> session runner
async fn read_inputs(
    session_id: Uuid,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    handle: &SessionHandle,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(session_id = %session_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        let input = SessionInput {
                            msg,
                            received_at: Instant::now(),
                        };

                        if handle.input_tx.send(input).await.is_err() {
                            debug!(session_id = %session_id, "Input channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("socket closed: {0}")]
    Socket(#[from] axum::Error),
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), SendError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
