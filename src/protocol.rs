//! Wire protocol between client and gateway
//!
//! One JSON object per WebSocket text frame; the `type` field selects the
//! variant. Every client frame passes through [`parse_client_frame`] before
//! it reaches the session manager — a rejected frame costs the sender one
//! `error` message, never the connection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum length of a base64 audio payload. A sanity floor against junk
/// frames, not a real length bound.
pub const MIN_AUDIO_PAYLOAD: usize = 8;

/// Client-to-gateway messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One capture block: base64 of 16-bit PCM, mono, 16 kHz
    Audio { data: String },
    /// End of the user's utterance (mic stopped)
    AudioEnd,
    /// Free-text turn, an alternative input modality
    Text { text: String },
    /// Reserved; new input already interrupts upstream output
    Cancel,
}

/// Gateway-to-client messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Upstream session is ready
    SessionOpen,
    /// Playable chunk: base64 of 16-bit PCM, mono, 24 kHz
    Audio { data: String },
    /// Model output was interrupted; flush the playback queue
    Interrupted,
    /// Model finished its turn
    TurnComplete,
    /// Live transcript of user speech
    InputStt { text: String },
    /// Live transcript of model speech
    OutputStt { text: String },
    /// Upstream session ended
    SessionClosed,
    /// Non-fatal unless it precedes connection close
    Error { message: String },
}

/// Why an inbound frame was rejected
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not valid JSON, unknown tag, or wrong payload shape
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Audio payload below the sanity floor
    #[error("audio payload too short: {0} chars (minimum {MIN_AUDIO_PAYLOAD})")]
    AudioTooShort(usize),

    /// Text turn empty after trimming
    #[error("text must not be empty")]
    EmptyText,
}

/// Decode and validate one inbound frame.
///
/// # Errors
///
/// Returns [`FrameError`] when the frame does not decode as a known
/// [`ClientMessage`] variant or fails its payload checks.
pub fn parse_client_frame(raw: &str) -> Result<ClientMessage, FrameError> {
    let msg: ClientMessage =
        serde_json::from_str(raw).map_err(|e| FrameError::Malformed(e.to_string()))?;

    match &msg {
        ClientMessage::Audio { data } if data.len() < MIN_AUDIO_PAYLOAD => {
            Err(FrameError::AudioTooShort(data.len()))
        }
        ClientMessage::Text { text } if text.trim().is_empty() => Err(FrameError::EmptyText),
        _ => Ok(msg),
    }
}
