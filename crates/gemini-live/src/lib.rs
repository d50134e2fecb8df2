//! Gemini Live runtime.
//!
//! Implements [`LiveRuntime`] over the Gemini Live bidirectional websocket. Each
//! session gets its own upstream connection; a background task forwards queued
//! requests upstream and turns server messages into [`LiveEvent`]s. Tool calls
//! issued by the model are answered through the session's [`NotesClient`].

pub mod protocol;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, Stream, StreamExt};
use protocol::{ClientMessage, ServerMessage};
use skylos_core::{
    live::{
        Blob, Content, LiveEvent, LiveEventStream, LiveRequest, LiveRuntime, LiveSession, Modality,
        Part, RunConfig,
    },
    notes::NotesClient,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{Instrument, error, info, warn};

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "gemini-live-2.5-flash-preview";

/// Live runtime backed by the Gemini Live API.
#[derive(Debug, Clone)]
pub struct GeminiLiveRuntime {
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiLiveRuntime {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl LiveRuntime for GeminiLiveRuntime {
    async fn run_live(
        &self,
        session: LiveSession,
        requests: mpsc::UnboundedReceiver<LiveRequest>,
        run_config: RunConfig,
    ) -> Result<LiveEventStream> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Gemini Live")?;
        info!(session_id = %session.id, "Connected to Gemini Live websocket.");
        let (mut upstream_tx, mut upstream_rx) = ws_stream.split();

        let setup = build_setup(&self.model, &session, &run_config);
        upstream_tx
            .send(WsMessage::Text(serde_json::to_string(&setup)?.into()))
            .await?;
        wait_for_setup(&mut upstream_rx).await?;
        info!("Gemini session setup is complete. Ready for bidirectional streaming.");

        let span = tracing::info_span!("gemini_live", session_id = %session.id, agent_id = %session.agent_id);
        Ok(spawn_session(upstream_tx, upstream_rx, requests, session.tools, span))
    }
}

/// Runs the session loop on its own task. A loop failure is delivered as the
/// last item of the returned stream.
fn spawn_session<Tx, Rx>(
    upstream_tx: Tx,
    upstream_rx: Rx,
    requests: mpsc::UnboundedReceiver<LiveRequest>,
    tools: Arc<NotesClient>,
    span: tracing::Span,
) -> LiveEventStream
where
    Tx: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin
        + Send
        + 'static,
    Rx: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin
        + Send
        + 'static,
{
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(
        async move {
            if let Err(e) = pump(upstream_tx, upstream_rx, requests, event_tx.clone(), tools).await
            {
                error!(error = ?e, "Gemini Live session terminated with error.");
                let _ = event_tx.send(Err(e));
            }
            info!("Gemini Live session finished.");
        }
        .instrument(span),
    );
    Box::pin(UnboundedReceiverStream::new(event_rx))
}

/// Builds the first message of a session: model, modality, voice, persona and tools.
pub fn build_setup(model: &str, session: &LiveSession, run_config: &RunConfig) -> ClientMessage {
    let model = if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    };
    let is_audio = run_config.response_modality == Modality::Audio;

    let function_declarations = session
        .tools
        .declarations()
        .into_iter()
        .map(|d| protocol::FunctionDeclaration {
            name: d.name,
            description: d.description,
            parameters_json_schema: d.parameters,
        })
        .collect();

    ClientMessage::Setup(protocol::BidiGenerateContentSetup {
        model,
        generation_config: protocol::GenerationConfig {
            response_modalities: vec![if is_audio {
                protocol::ResponseModality::Audio
            } else {
                protocol::ResponseModality::Text
            }],
            speech_config: run_config.speech.as_ref().map(|s| protocol::SpeechConfig {
                voice_config: protocol::VoiceConfig {
                    prebuilt_voice_config: protocol::PrebuiltVoiceConfig {
                        voice_name: s.voice_name.clone(),
                    },
                },
                language_code: s.language_code.clone(),
            }),
        },
        system_instruction: protocol::Content {
            role: None,
            parts: vec![protocol::Part {
                text: session.instruction.clone(),
            }],
        },
        tools: vec![protocol::Tool {
            function_declarations,
        }],
        output_audio_transcription: is_audio.then(protocol::AudioTranscriptionConfig::default),
    })
}

/// Maps a queued request to its upstream message. `Close` has no mapping.
pub fn to_client_message(request: LiveRequest) -> Option<ClientMessage> {
    match request {
        LiveRequest::Content(content) => Some(ClientMessage::ClientContent(
            protocol::BidiGenerateContentClientContent {
                turns: vec![protocol::Content {
                    role: Some(content.role),
                    parts: content
                        .parts
                        .into_iter()
                        .filter_map(|p| p.text)
                        .map(|text| protocol::Part { text })
                        .collect(),
                }],
                turn_complete: true,
            },
        )),
        LiveRequest::Realtime(blob) => Some(ClientMessage::RealtimeInput(
            protocol::BidiGenerateContentRealtimeInput {
                audio: protocol::Blob {
                    mime_type: blob.mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(&blob.data),
                },
            },
        )),
        LiveRequest::Close => None,
    }
}

/// Turns one `serverContent` message into runtime events: one event per
/// content part, then a control event if the turn completed or was interrupted.
pub fn events_from_content(content: protocol::LiveServerContent) -> Result<Vec<LiveEvent>> {
    let mut events = Vec::new();

    for part in content.model_turn.map(|t| t.parts).unwrap_or_default() {
        if let Some(blob) = part.inline_data {
            let data = base64::engine::general_purpose::STANDARD
                .decode(&blob.data)
                .context("Invalid base64 audio from Gemini")?;
            events.push(model_event(Part::from_blob(Blob {
                mime_type: blob.mime_type,
                data,
            })));
        } else if let Some(text) = part.text {
            events.push(model_event(Part::from_text(text)));
        }
    }

    if let Some(transcription) = content.output_transcription {
        if !transcription.text.is_empty() {
            events.push(model_event(Part::from_text(transcription.text)));
        }
    }

    if content.turn_complete || content.interrupted {
        events.push(LiveEvent {
            turn_complete: content.turn_complete,
            interrupted: content.interrupted,
            ..Default::default()
        });
    }
    Ok(events)
}

fn model_event(part: Part) -> LiveEvent {
    LiveEvent {
        content: Some(Content {
            role: "model".to_string(),
            parts: vec![part],
        }),
        partial: true,
        ..Default::default()
    }
}

/// Runs every function call through the session's tools and collects replies.
pub async fn answer_tool_call(
    tools: &NotesClient,
    call: protocol::LiveServerToolCall,
) -> ClientMessage {
    let mut function_responses = Vec::with_capacity(call.function_calls.len());
    for fc in call.function_calls {
        let response = match tools.dispatch(&fc.name, fc.args).await {
            Ok(result) => serde_json::json!({ "result": result }),
            Err(e) => {
                warn!(tool = %fc.name, error = %e, "Tool call failed");
                serde_json::json!({ "error": e })
            }
        };
        function_responses.push(protocol::FunctionResponse {
            id: fc.id,
            name: fc.name,
            response,
        });
    }
    ClientMessage::ToolResponse(protocol::BidiGenerateContentToolResponse { function_responses })
}

fn parse_server_message(msg: &WsMessage) -> Option<serde_json::Result<ServerMessage>> {
    match msg {
        WsMessage::Text(text) => Some(serde_json::from_str(text)),
        WsMessage::Binary(data) => Some(serde_json::from_slice(data)),
        _ => None,
    }
}

async fn wait_for_setup<S>(upstream_rx: &mut S) -> Result<()>
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = upstream_rx.next().await {
        let msg = msg?;
        if let WsMessage::Close(frame) = &msg {
            return Err(anyhow!("Gemini closed the connection during setup: {:?}", frame));
        }
        match parse_server_message(&msg) {
            Some(Ok(server_msg)) if server_msg.setup_complete.is_some() => return Ok(()),
            Some(Ok(server_msg)) => {
                error!("Received unexpected JSON during Gemini setup: {:?}", server_msg)
            }
            Some(Err(e)) => error!("Failed to parse Gemini message during setup: {}", e),
            None => {}
        }
    }
    Err(anyhow!("Gemini connection ended before setup completed"))
}

async fn pump<Tx, Rx>(
    mut upstream_tx: Tx,
    mut upstream_rx: Rx,
    mut requests: mpsc::UnboundedReceiver<LiveRequest>,
    event_tx: mpsc::UnboundedSender<Result<LiveEvent>>,
    tools: Arc<NotesClient>,
) -> Result<()>
where
    Tx: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    Rx: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(message) = request.and_then(to_client_message) else {
                    info!("Request queue closed. Closing Gemini connection.");
                    let _ = upstream_tx.send(WsMessage::Close(None)).await;
                    break;
                };
                upstream_tx
                    .send(WsMessage::Text(serde_json::to_string(&message)?.into()))
                    .await?;
            },
            msg = upstream_rx.next() => {
                let msg = match msg {
                    Some(Ok(WsMessage::Close(frame))) => {
                        warn!(?frame, "Gemini websocket closed by server.");
                        break;
                    }
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        let _ = event_tx.send(Err(anyhow!("Error reading from Gemini websocket: {}", e)));
                        break;
                    }
                    None => break,
                };
                let server_msg = match parse_server_message(&msg) {
                    Some(Ok(server_msg)) => server_msg,
                    Some(Err(e)) => {
                        warn!("Failed to parse Gemini message: {}", e);
                        continue;
                    }
                    None => continue,
                };

                if let Some(content) = server_msg.server_content {
                    for event in events_from_content(content)? {
                        if event_tx.send(Ok(event)).is_err() {
                            info!("Event consumer dropped. Closing Gemini connection.");
                            let _ = upstream_tx.send(WsMessage::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
                if let Some(call) = server_msg.tool_call {
                    let reply = answer_tool_call(&tools, call).await;
                    upstream_tx
                        .send(WsMessage::Text(serde_json::to_string(&reply)?.into()))
                        .await?;
                }
                if server_msg.go_away.is_some() {
                    warn!("Gemini announced the connection will close soon.");
                }
            },
        }
    }
    Ok(())
}
