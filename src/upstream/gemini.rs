//! Gemini Live API engine
//!
//! Bidirectional streaming over the `BidiGenerateContent` WebSocket
//! endpoint: one `setup` frame configures the session (audio-out modality,
//! system instruction, live transcription), then `realtimeInput` frames
//! flow up and `serverContent` frames flow down. No reconnect and no
//! timeouts — a dead session surfaces as a `Closed` event and the client
//! reconnects manually.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::{Error, Result};

use super::{LiveEngine, LiveSession, RealtimeInput, ServerContent, SessionConfig, SessionEvent};

const LIVE_PATH: &str =
    "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const EVENT_BUFFER: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gemini Live API client
pub struct GeminiLive {
    api_key: String,
    host: String,
}

impl GeminiLive {
    /// Create an engine for the given API key and host
    #[must_use]
    pub fn new(api_key: String, host: String) -> Self {
        Self { api_key, host }
    }
}

#[async_trait]
impl LiveEngine for GeminiLive {
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>)> {
        let url = format!("wss://{}{}?key={}", self.host, LIVE_PATH, self.api_key);

        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Upstream(format!("live connect failed: {e}")))?;
        let (mut sink, stream) = ws.split();

        let setup = serde_json::to_string(&SetupFrame::new(config))?;
        sink.send(Message::Text(setup))
            .await
            .map_err(|e| Error::Upstream(format!("session setup failed: {e}")))?;

        tracing::debug!(model = %config.model, "live session opened");

        let (events, event_rx) = mpsc::channel(EVENT_BUFFER);
        let _ = events.send(SessionEvent::Open).await;
        tokio::spawn(read_events(stream, events));

        Ok((Box::new(GeminiSession { sink: Some(sink) }), event_rx))
    }
}

/// Send half of one live session
struct GeminiSession {
    // None once closed; close is idempotent
    sink: Option<SplitSink<WsStream, Message>>,
}

#[async_trait]
impl LiveSession for GeminiSession {
    async fn send(&mut self, input: RealtimeInput) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Err(Error::Upstream("session is closed".to_string()));
        };

        let frame = serde_json::to_string(&RealtimeFrame::from(input))?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| Error::Upstream(format!("realtime input failed: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.take() {
            // Best effort: the peer may already be gone
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
            tracing::debug!("live session closed");
        }
        Ok(())
    }
}

/// Translate raw frames into session events until the socket ends
async fn read_events(mut stream: SplitStream<WsStream>, events: mpsc::Sender<SessionEvent>) {
    loop {
        let frame = match stream.next().await {
            Some(Ok(Message::Text(text))) => parse_server_frame(text.as_bytes()),
            // The Live API delivers most frames as binary-encoded JSON
            Some(Ok(Message::Binary(bytes))) => parse_server_frame(&bytes),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => None,
            Some(Err(e)) => {
                if events.send(SessionEvent::Error(e.to_string())).await.is_err() {
                    return;
                }
                break;
            }
        };

        if let Some(event) = frame {
            if events.send(event).await.is_err() {
                return;
            }
        }
    }

    let _ = events.send(SessionEvent::Closed).await;
}

fn parse_server_frame(raw: &[u8]) -> Option<SessionEvent> {
    match serde_json::from_slice::<ServerFrame>(raw) {
        Ok(frame) => frame.server_content.map(|content| SessionEvent::Content(content.into())),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unrecognized upstream frame");
            None
        }
    }
}

// ---- wire format: client -> engine

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupFrame<'a> {
    setup: Setup<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup<'a> {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content<'a>,
    input_audio_transcription: Empty,
    output_audio_transcription: Empty,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Empty {}

impl<'a> SetupFrame<'a> {
    fn new(config: &'a SessionConfig) -> Self {
        Self {
            setup: Setup {
                model: format!("models/{}", config.model),
                generation_config: GenerationConfig {
                    response_modalities: ["AUDIO"],
                },
                system_instruction: Content {
                    parts: [TextPart {
                        text: &config.system_instruction,
                    }],
                },
                input_audio_transcription: Empty {},
                output_audio_transcription: Empty {},
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeFrame {
    realtime_input: RealtimeInputFrame,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<AudioBlob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_stream_end: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioBlob {
    data: String,
    mime_type: String,
}

impl From<RealtimeInput> for RealtimeFrame {
    fn from(input: RealtimeInput) -> Self {
        let inner = match input {
            RealtimeInput::Audio { data, mime_type } => RealtimeInputFrame {
                audio: Some(AudioBlob { data, mime_type }),
                ..Default::default()
            },
            RealtimeInput::AudioStreamEnd => RealtimeInputFrame {
                audio_stream_end: Some(true),
                ..Default::default()
            },
            RealtimeInput::Text(text) => RealtimeInputFrame {
                text: Some(text),
                ..Default::default()
            },
        };
        Self {
            realtime_input: inner,
        }
    }
}

// ---- wire format: engine -> client

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerFrame {
    #[serde(default)]
    server_content: Option<RawServerContent>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawServerContent {
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    input_transcription: Option<Transcription>,
    #[serde(default)]
    output_transcription: Option<Transcription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<Blob>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Default)]
struct Transcription {
    #[serde(default)]
    text: String,
}

impl From<RawServerContent> for ServerContent {
    fn from(raw: RawServerContent) -> Self {
        let audio = raw.model_turn.and_then(|turn| {
            turn.parts.into_iter().find_map(|part| {
                part.inline_data
                    .filter(|blob| blob.mime_type.starts_with("audio/pcm"))
                    .map(|blob| blob.data)
            })
        });

        let transcript = |t: Option<Transcription>| t.map(|t| t.text).filter(|s| !s.is_empty());

        Self {
            audio,
            interrupted: raw.interrupted,
            input_transcription: transcript(raw.input_transcription),
            output_transcription: transcript(raw.output_transcription),
            turn_complete: raw.turn_complete,
        }
    }
}
