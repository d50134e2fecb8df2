//! Live Runtime Seam
//!
//! Types exchanged with the hosted live-agent runtime, independent of any
//! particular provider. A runtime consumes [`LiveRequest`]s from a queue and
//! produces a stream of [`LiveEvent`]s.

use crate::notes::NotesClient;
use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Binary payload tagged with its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// One piece of content: text, inline binary data, or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn from_blob(blob: Blob) -> Self {
        Self {
            text: None,
            inline_data: Some(blob),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::from_text(text)],
        }
    }
}

/// An event emitted by the runtime during a live session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveEvent {
    pub content: Option<Content>,
    /// Set on streamed text deltas.
    pub partial: bool,
    pub turn_complete: bool,
    pub interrupted: bool,
}

impl LiveEvent {
    pub fn first_part(&self) -> Option<&Part> {
        self.content.as_ref().and_then(|c| c.parts.first())
    }
}

/// Input handed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveRequest {
    /// A complete conversational turn (e.g. typed user text).
    Content(Content),
    /// Streaming realtime input such as microphone audio.
    Realtime(Blob),
    /// The client side is gone; the runtime should release the session.
    Close,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("live request queue is closed")]
    Closed,
}

/// Sending half of a session's input queue. Cheap to clone; all clones share
/// the closed flag, so [`LiveRequestQueue::close`] takes effect exactly once.
#[derive(Debug, Clone)]
pub struct LiveRequestQueue {
    tx: mpsc::UnboundedSender<LiveRequest>,
    closed: Arc<AtomicBool>,
}

impl LiveRequestQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LiveRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    pub fn send_content(&self, content: Content) -> Result<(), QueueError> {
        self.send(LiveRequest::Content(content))
    }

    pub fn send_realtime(&self, blob: Blob) -> Result<(), QueueError> {
        self.send(LiveRequest::Realtime(blob))
    }

    /// Signals the runtime to end the session. Returns `false` if the queue
    /// was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        // The runtime may already be gone; nothing left to release then.
        let _ = self.tx.send(LiveRequest::Close);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn send(&self, request: LiveRequest) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        self.tx.send(request).map_err(|_| QueueError::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechConfig {
    pub voice_name: String,
    pub language_code: String,
}

/// Response configuration for a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub response_modality: Modality,
    pub speech: Option<SpeechConfig>,
}

impl RunConfig {
    pub fn text() -> Self {
        Self {
            response_modality: Modality::Text,
            speech: None,
        }
    }

    pub fn audio(voice_name: impl Into<String>, language_code: impl Into<String>) -> Self {
        Self {
            response_modality: Modality::Audio,
            speech: Some(SpeechConfig {
                voice_name: voice_name.into(),
                language_code: language_code.into(),
            }),
        }
    }
}

/// A function the runtime may call, described with a JSON schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A freshly created runtime session, scoped to one user and one agent.
pub struct LiveSession {
    pub id: Uuid,
    pub app_name: String,
    pub user_id: String,
    pub agent_id: String,
    pub instruction: String,
    pub tools: Arc<NotesClient>,
}

pub type LiveEventStream = Pin<Box<dyn Stream<Item = Result<LiveEvent>> + Send>>;

/// A hosted runtime able to run a live agent loop.
#[async_trait]
pub trait LiveRuntime: Send + Sync {
    /// Starts the live loop for `session`. Requests are read from `requests`
    /// until a [`LiveRequest::Close`] arrives or the queue is dropped.
    async fn run_live(
        &self,
        session: LiveSession,
        requests: mpsc::UnboundedReceiver<LiveRequest>,
        run_config: RunConfig,
    ) -> Result<LiveEventStream>;
}
