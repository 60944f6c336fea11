//! Per-connection session manager
//!
//! Binds one client channel to exactly one upstream session for the life
//! of the connection: validates inbound frames and translates them into
//! realtime input, fans upstream events out into client messages in
//! arrival order, and owns the lifecycle (open once, close once, suppress
//! sends after either side is gone).

use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage, parse_client_frame};
use crate::upstream::{
    INPUT_MIME, LiveEngine, LiveSession, RealtimeInput, ServerContent, SessionConfig, SessionEvent,
};
use crate::Result;

/// Session lifecycle. Explicit so every transition is guarded in one
/// place instead of a closed-flag checked ad hoc before each send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Closed,
}

/// One channel's binding to its upstream session
struct Session {
    upstream: Box<dyn LiveSession>,
    state: SessionState,
}

impl Session {
    /// Translate one validated client message into upstream input.
    /// `cancel` is deliberately inert: the engine treats new input as an
    /// implicit interruption.
    async fn forward(&mut self, msg: ClientMessage) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        match msg {
            ClientMessage::Audio { data } => {
                self.upstream
                    .send(RealtimeInput::Audio {
                        data,
                        mime_type: INPUT_MIME.to_string(),
                    })
                    .await
            }
            ClientMessage::AudioEnd => self.upstream.send(RealtimeInput::AudioStreamEnd).await,
            ClientMessage::Text { text } => self.upstream.send(RealtimeInput::Text(text)).await,
            ClientMessage::Cancel => Ok(()),
        }
    }

    /// Close the upstream session. Idempotent: repeated closes, or a close
    /// after the upstream already ended, do nothing.
    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        if let Err(e) = self.upstream.close().await {
            tracing::debug!(error = %e, "upstream close failed");
        }
    }

    /// Record that the upstream ended on its own; no close call is owed.
    fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
    }
}

/// Translate one upstream event into zero or more client messages,
/// preserving the fixed field-check order: audio, interrupted, input
/// transcript, output transcript, turn-complete.
fn fan_out(content: ServerContent) -> Vec<ServerMessage> {
    let mut out = Vec::new();

    if let Some(data) = content.audio {
        out.push(ServerMessage::Audio { data });
    }
    if content.interrupted {
        out.push(ServerMessage::Interrupted);
    }
    if let Some(text) = content.input_transcription {
        out.push(ServerMessage::InputStt { text });
    }
    if let Some(text) = content.output_transcription {
        out.push(ServerMessage::OutputStt { text });
    }
    if content.turn_complete {
        out.push(ServerMessage::TurnComplete);
    }

    out
}

/// Relay one connection until either side ends.
///
/// `inbound` carries raw text frames from the client channel; `outbound`
/// is the per-connection send function. A validation failure costs the
/// sender one `error` frame and the relay continues. When the client
/// channel closes the upstream session is closed exactly once; when the
/// upstream ends, `session_closed` is emitted and the relay returns so the
/// caller can drop the channel.
///
/// # Errors
///
/// Returns [`crate::Error::Upstream`] when the upstream session cannot be
/// opened — after emitting a single `error` frame. The caller must then
/// close the channel; nothing was or will be forwarded.
pub async fn run_session<E>(
    engine: &E,
    config: &SessionConfig,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<ServerMessage>,
) -> Result<()>
where
    E: LiveEngine + ?Sized,
{
    let (upstream, mut events) = match engine.connect(config).await {
        Ok(pair) => pair,
        Err(e) => {
            let _ = outbound
                .send(ServerMessage::Error {
                    message: e.to_string(),
                })
                .await;
            return Err(e);
        }
    };

    let mut session = Session {
        upstream,
        state: SessionState::Open,
    };

    loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(raw) => match parse_client_frame(&raw) {
                    Ok(msg) => {
                        if let Err(e) = session.forward(msg).await {
                            tracing::warn!(error = %e, "forward to upstream failed");
                            if !emit(&outbound, ServerMessage::Error { message: e.to_string() }).await {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "rejected client frame");
                        if !emit(&outbound, ServerMessage::Error { message: e.to_string() }).await {
                            break;
                        }
                    }
                },
                // client channel closed; the second close() after the loop
                // is the idempotence guard at work
                None => {
                    session.close().await;
                    break;
                }
            },
            event = events.recv() => match event {
                Some(SessionEvent::Open) => {
                    if !emit(&outbound, ServerMessage::SessionOpen).await {
                        break;
                    }
                }
                Some(SessionEvent::Content(content)) => {
                    let mut delivered = true;
                    for msg in fan_out(content) {
                        if !emit(&outbound, msg).await {
                            delivered = false;
                            break;
                        }
                    }
                    if !delivered {
                        break;
                    }
                }
                Some(SessionEvent::Error(message)) => {
                    if !emit(&outbound, ServerMessage::Error { message }).await {
                        break;
                    }
                }
                Some(SessionEvent::Closed) | None => {
                    session.mark_closed();
                    let _ = emit(&outbound, ServerMessage::SessionClosed).await;
                    break;
                }
            },
        }
    }

    session.close().await;
    Ok(())
}

/// Send toward the client; a gone channel is suppressed, not an error.
async fn emit(outbound: &mpsc::Sender<ServerMessage>, msg: ServerMessage) -> bool {
    outbound.send(msg).await.is_ok()
}
