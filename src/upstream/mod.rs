//! Upstream conversational engine
//!
//! The gateway treats the speech model as an opaque capability: connect
//! once per client channel, push realtime audio/text input, receive an
//! ordered stream of audio/transcript/control events. The seam keeps the
//! session manager independent of any concrete provider and lets tests
//! script the upstream.

mod gemini;

pub use gemini::GeminiLive;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;

/// MIME type tag for realtime audio input frames
pub const INPUT_MIME: &str = "audio/pcm;rate=16000";

/// Configuration for one upstream session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model identifier
    pub model: String,
    /// Behavioral constraint string, passed to the engine verbatim
    pub system_instruction: String,
}

/// Realtime input accepted by a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeInput {
    /// Base64 PCM with its MIME tag
    Audio { data: String, mime_type: String },
    /// End-of-stream marker for the current utterance
    AudioStreamEnd,
    /// Text turn
    Text(String),
}

/// Content fields carried by one upstream event. A single event may set
/// several fields and therefore fan out to several client messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerContent {
    /// Base64 PCM chunk at 24 kHz
    pub audio: Option<String>,
    /// Model output was cut off by new user input
    pub interrupted: bool,
    /// Transcript fragment of user speech
    pub input_transcription: Option<String>,
    /// Transcript fragment of model speech
    pub output_transcription: Option<String>,
    /// Model finished its turn
    pub turn_complete: bool,
}

/// Asynchronous session events, delivered in upstream arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session is established and ready for input
    Open,
    /// Model produced content
    Content(ServerContent),
    /// Runtime error from the engine
    Error(String),
    /// The engine ended the session
    Closed,
}

/// A conversational engine that can open live sessions
#[async_trait]
pub trait LiveEngine: Send + Sync {
    /// Open a session: a handle for sending input plus the ordered event
    /// stream the engine delivers on.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Upstream`] when the session cannot be
    /// established.
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>)>;
}

/// The send half of an open session
#[async_trait]
pub trait LiveSession: Send {
    /// Forward one realtime input to the engine
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Upstream`] when the input cannot be sent.
    async fn send(&mut self, input: RealtimeInput) -> Result<()>;

    /// Close the session. Closing an already-closed session must not fail.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Upstream`] on transport failures while
    /// closing a live session.
    async fn close(&mut self) -> Result<()>;
}
