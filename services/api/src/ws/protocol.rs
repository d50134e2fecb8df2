//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_PCM: &str = "audio/pcm";

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
pub struct ClientFrame {
    /// `text/plain` or `audio/pcm`.
    pub mime_type: String,
    /// Plain text, or base64-encoded 16-bit PCM.
    pub data: String,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServerFrame {
    /// A chunk of agent output: text delta or base64 PCM audio.
    Media { mime_type: String, data: String },
    /// The agent finished its turn or was interrupted by the user.
    Control {
        turn_complete: bool,
        interrupted: bool,
    },
}

impl ServerFrame {
    pub fn text(data: impl Into<String>) -> Self {
        Self::Media {
            mime_type: MIME_TEXT.to_string(),
            data: data.into(),
        }
    }

    pub fn audio(base64_data: String) -> Self {
        Self::Media {
            mime_type: MIME_PCM.to_string(),
            data: base64_data,
        }
    }
}
