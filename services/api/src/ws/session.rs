//! Manages the WebSocket connection lifecycle for a live agent session.

use super::relay::run_relay;
use crate::state::AppState;
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::StreamExt;
use serde::{Deserialize, Deserializer};
use skylos_core::{agents::DEFAULT_AGENT_ID, session::SessionRequest};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Query parameters of the websocket endpoint.
#[derive(Deserialize, Debug, PartialEq, Eq)]
pub struct WsParams {
    /// Audio mode only when the value is exactly `true`.
    #[serde(default, deserialize_with = "audio_flag")]
    pub is_audio: bool,
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    pub voice_name: Option<String>,
    pub language_code: Option<String>,
}

fn default_agent_id() -> String {
    DEFAULT_AGENT_ID.to_string()
}

fn audio_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(String::deserialize(deserializer)? == "true")
}

impl WsParams {
    pub fn into_request(self, user_id: String) -> SessionRequest {
        SessionRequest {
            user_id,
            is_audio: self.is_audio,
            agent_id: self.agent_id,
            voice_name: self.voice_name,
            language_code: self.language_code,
        }
    }
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let request = params.into_request(user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, request))
}

/// Starts the agent session and relays traffic until either side is done.
#[instrument(
    name = "ws_session",
    skip_all,
    fields(user_id = %request.user_id, agent_id = %request.agent_id, is_audio = request.is_audio)
)]
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, request: SessionRequest) {
    info!("Client connected.");

    let (events, queue) = match state.bootstrapper.start(&request).await {
        Ok(started) => started,
        Err(e) => {
            error!(error = ?e, "Failed to start agent session.");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (socket_tx, socket_rx) = socket.split();
    match run_relay(socket_tx, socket_rx, events, queue).await {
        Ok(()) => info!("Client disconnected."),
        Err(e) => warn!(error = %e, "Relay ended with error."),
    }
}
