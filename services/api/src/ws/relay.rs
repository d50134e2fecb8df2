//! Bidirectional relay between a browser websocket and a live agent session.
//!
//! Two pumps run concurrently on the connection task. The first one to finish
//! cancels the other, and the agent's request queue is closed exactly once.

use super::protocol::{ClientFrame, MIME_PCM, MIME_TEXT, ServerFrame};
use axum::extract::ws::Message;
use base64::Engine;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use skylos_core::live::{Blob, Content, LiveEventStream, LiveRequestQueue, QueueError};
use std::fmt::Display;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Mime type not supported: {0}")]
    UnsupportedMimeType(String),
    #[error("Malformed client frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    #[error("Invalid base64 audio: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
    #[error("Agent input queue is closed")]
    AgentClosed(#[from] QueueError),
    #[error("Agent stream failed: {0}")]
    Agent(anyhow::Error),
}

/// Converts one agent event into at most one client frame.
pub fn frame_for_event(event: &skylos_core::live::LiveEvent) -> Option<ServerFrame> {
    if event.turn_complete || event.interrupted {
        return Some(ServerFrame::Control {
            turn_complete: event.turn_complete,
            interrupted: event.interrupted,
        });
    }

    let part = event.first_part()?;
    if let Some(blob) = &part.inline_data {
        if blob.mime_type.starts_with(MIME_PCM) && !blob.data.is_empty() {
            return Some(ServerFrame::audio(
                base64::engine::general_purpose::STANDARD.encode(&blob.data),
            ));
        }
    }
    match &part.text {
        Some(text) if event.partial && !text.is_empty() => Some(ServerFrame::text(text.clone())),
        _ => None,
    }
}

/// Forwards agent events to the client until the event stream ends or fails.
/// A socket that refuses a frame means the client is gone, which ends the pump
/// normally.
pub async fn agent_to_client<S>(mut sink: S, mut events: LiveEventStream) -> Result<(), RelayError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(event) = events.next().await {
        let event = event.map_err(RelayError::Agent)?;
        let Some(frame) = frame_for_event(&event) else {
            continue;
        };
        let text = serde_json::to_string(&frame)?;
        match &frame {
            ServerFrame::Media { mime_type, data } if mime_type == MIME_PCM => {
                debug!("[AGENT TO CLIENT]: audio/pcm: {} base64 chars", data.len())
            }
            _ => debug!("[AGENT TO CLIENT]: {}", text),
        }
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            info!("Client disconnected while sending: {}", e);
            return Ok(());
        }
    }
    info!("Agent event stream ended.");
    Ok(())
}

/// Feeds client frames into the agent queue. A client disconnect ends the pump
/// normally; an unsupported or malformed frame ends it with an error.
pub async fn client_to_agent<R, E>(
    mut stream: R,
    queue: &LiveRequestQueue,
) -> Result<(), RelayError>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                info!("Client connection lost: {}", e);
                return Ok(());
            }
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame: ClientFrame = serde_json::from_str(text.as_str())?;

        match frame.mime_type.as_str() {
            MIME_TEXT => {
                debug!("[CLIENT TO AGENT]: {}", frame.data);
                queue.send_content(Content::user_text(frame.data))?;
            }
            MIME_PCM => {
                let data = base64::engine::general_purpose::STANDARD.decode(&frame.data)?;
                debug!("[CLIENT TO AGENT]: audio/pcm: {} bytes.", data.len());
                queue.send_realtime(Blob {
                    mime_type: frame.mime_type,
                    data,
                })?;
            }
            _ => return Err(RelayError::UnsupportedMimeType(frame.mime_type)),
        }
    }
    info!("Client disconnected.");
    Ok(())
}

/// Runs both pumps until either finishes, then closes the agent queue.
pub async fn run_relay<S, R, E>(
    sink: S,
    stream: R,
    events: LiveEventStream,
    queue: LiveRequestQueue,
) -> Result<(), RelayError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let result = tokio::select! {
        r = agent_to_client(sink, events) => r,
        r = client_to_agent(stream, &queue) => r,
    };
    queue.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use skylos_core::live::{LiveEvent, LiveRequest, Part};
    use std::convert::Infallible;

    fn events(items: Vec<LiveEvent>) -> LiveEventStream {
        Box::pin(stream::iter(items.into_iter().map(Ok)))
    }

    fn text_msg(json: &str) -> Result<Message, Infallible> {
        Ok(Message::Text(json.to_string().into()))
    }

    fn model_event(part: Part, partial: bool) -> LiveEvent {
        LiveEvent {
            content: Some(Content {
                role: "model".into(),
                parts: vec![part],
            }),
            partial,
            ..Default::default()
        }
    }

    fn sent_text(sent: &[Message]) -> Vec<String> {
        sent.iter()
            .map(|m| match m {
                Message::Text(t) => t.as_str().to_string(),
                other => panic!("unexpected frame {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pcm_audio_is_base64_encoded() {
        let audio = model_event(
            Part::from_blob(Blob {
                mime_type: "audio/pcm;rate=24000".into(),
                data: b"\x01\x02".to_vec(),
            }),
            false,
        );
        let mut sent: Vec<Message> = Vec::new();

        agent_to_client(&mut sent, events(vec![audio])).await.unwrap();

        assert_eq!(
            sent_text(&sent),
            vec![r#"{"mime_type":"audio/pcm","data":"AQI="}"#]
        );
    }

    #[tokio::test]
    async fn test_outbound_frames_in_order() {
        let stream = events(vec![
            model_event(Part::from_text("Hola"), true),
            model_event(Part::from_text("final, no partial"), false),
            LiveEvent::default(),
            LiveEvent {
                turn_complete: true,
                ..Default::default()
            },
            LiveEvent {
                interrupted: true,
                ..Default::default()
            },
        ]);
        let mut sent: Vec<Message> = Vec::new();

        agent_to_client(&mut sent, stream).await.unwrap();

        assert_eq!(
            sent_text(&sent),
            vec![
                r#"{"mime_type":"text/plain","data":"Hola"}"#,
                r#"{"turn_complete":true,"interrupted":false}"#,
                r#"{"turn_complete":false,"interrupted":true}"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_agent_stream_error_ends_outbound() {
        let failing: LiveEventStream =
            Box::pin(stream::iter(vec![Err::<LiveEvent, _>(anyhow::anyhow!("upstream gone"))]));
        let mut sent: Vec<Message> = Vec::new();

        let err = agent_to_client(&mut sent, failing).await.unwrap_err();
        assert!(matches!(err, RelayError::Agent(_)));
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_inbound_text_and_audio() {
        let (queue, mut rx) = LiveRequestQueue::new();
        let input = stream::iter(vec![
            text_msg(r#"{"mime_type":"text/plain","data":"hola"}"#),
            text_msg(r#"{"mime_type":"audio/pcm","data":"AQI="}"#),
        ]);

        client_to_agent(input, &queue).await.unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            LiveRequest::Content(Content::user_text("hola"))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            LiveRequest::Realtime(Blob {
                mime_type: "audio/pcm".into(),
                data: vec![1, 2],
            })
        );
    }

    #[tokio::test]
    async fn test_unsupported_mime_type_ends_inbound() {
        let (queue, mut rx) = LiveRequestQueue::new();
        let input = stream::iter(vec![
            text_msg(r#"{"mime_type":"video/mp4","data":"AAAA"}"#),
            text_msg(r#"{"mime_type":"text/plain","data":"never sent"}"#),
        ]);

        let err = client_to_agent(input, &queue).await.unwrap_err();

        assert!(matches!(err, RelayError::UnsupportedMimeType(ref m) if m == "video/mp4"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_errors() {
        let (queue, _rx) = LiveRequestQueue::new();

        let missing_data = stream::iter(vec![text_msg(r#"{"mime_type":"text/plain"}"#)]);
        let err = client_to_agent(missing_data, &queue).await.unwrap_err();
        assert!(matches!(err, RelayError::MalformedFrame(_)));

        let bad_audio = stream::iter(vec![text_msg(r#"{"mime_type":"audio/pcm","data":"***"}"#)]);
        let err = client_to_agent(bad_audio, &queue).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidAudio(_)));
    }

    #[tokio::test]
    async fn test_disconnect_closes_queue_once() {
        let (queue, mut rx) = LiveRequestQueue::new();
        let observer = queue.clone();
        let input = stream::iter(vec![
            text_msg(r#"{"mime_type":"text/plain","data":"adiós"}"#),
            Ok(Message::Close(None)),
        ]);
        let never_ending: LiveEventStream = Box::pin(stream::pending());
        let mut sent: Vec<Message> = Vec::new();

        run_relay(&mut sent, input, never_ending, queue).await.unwrap();

        assert!(observer.is_closed());
        assert!(!observer.close());
        assert_eq!(
            rx.try_recv().unwrap(),
            LiveRequest::Content(Content::user_text("adiós"))
        );
        assert_eq!(rx.try_recv().unwrap(), LiveRequest::Close);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_agent_end_also_closes_queue() {
        let (queue, mut rx) = LiveRequestQueue::new();
        let idle_client = stream::pending::<Result<Message, Infallible>>();
        let mut sent: Vec<Message> = Vec::new();

        run_relay(&mut sent, idle_client, events(vec![]), queue)
            .await
            .unwrap();

        assert_eq!(rx.try_recv().unwrap(), LiveRequest::Close);
    }

    #[tokio::test]
    async fn test_client_gone_mid_send_is_a_normal_end() {
        let (queue, mut rx) = LiveRequestQueue::new();
        let observer = queue.clone();
        let closed_socket = futures_util::sink::unfold((), |_, _msg: Message| async {
            Err::<(), _>(std::io::Error::other("Connection closed normally"))
        });
        let idle_client = stream::pending::<Result<Message, Infallible>>();

        run_relay(
            Box::pin(closed_socket),
            idle_client,
            events(vec![model_event(Part::from_text("Hola"), true)]),
            queue,
        )
        .await
        .unwrap();

        assert!(observer.is_closed());
        assert_eq!(rx.try_recv().unwrap(), LiveRequest::Close);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_client_read_error_is_a_normal_end() {
        let (queue, mut rx) = LiveRequestQueue::new();
        let broken = stream::iter(vec![
            text_msg(r#"{"mime_type":"text/plain","data":"hola"}"#).map_err(|never| match never {}),
            Err(std::io::Error::other("Connection reset without closing handshake")),
        ]);
        let never_ending: LiveEventStream = Box::pin(stream::pending());
        let mut sent: Vec<Message> = Vec::new();

        run_relay(&mut sent, broken, never_ending, queue).await.unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            LiveRequest::Content(Content::user_text("hola"))
        );
        assert_eq!(rx.try_recv().unwrap(), LiveRequest::Close);
        assert!(rx.try_recv().is_err());
    }
}
