//! Interactive voice client
//!
//! Connects to a gateway, streams the microphone up and plays the model's
//! audio back, printing live transcripts. Lines typed on stdin go up as
//! text turns. Ctrl-C stops the microphone (emitting `audio_end`) and
//! disconnects.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::audio::{CapturePipeline, CpalSink, PlaybackPipeline, decode_base64};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::{Error, Result};

/// Run a live conversation against the gateway at `server` until the
/// session ends or the user interrupts.
///
/// # Errors
///
/// Returns an error if the gateway is unreachable or the microphone cannot
/// be opened.
#[allow(clippy::future_not_send)] // cpal streams pin this future to the main task
pub async fn run(server: &str) -> Result<()> {
    let (ws, _response) = connect_async(server)
        .await
        .map_err(|e| Error::Transport(format!("connect to {server} failed: {e}")))?;
    tracing::info!(server, "connected to gateway");

    let (mut sink, mut stream) = ws.split();

    let (frame_tx, mut frames) = mpsc::unbounded_channel();
    let mut capture = CapturePipeline::new(frame_tx);
    let playback = PlaybackPipeline::new(Arc::new(CpalSink::new()));

    capture.start()?;
    println!("Microphone streaming. Type a line to send text; Ctrl-C to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if send_frame(&mut sink, &frame).await.is_err() {
                    tracing::error!("gateway send failed");
                    break;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            if !handle_server(&playback, msg) {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "unreadable server frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("gateway closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "transport error");
                    break;
                }
            },
            line = lines.next_line() => {
                if let Ok(Some(line)) = line {
                    let text = line.trim();
                    if !text.is_empty() {
                        let frame = ClientMessage::Text { text: text.to_string() };
                        if send_frame(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("stopping");
                // stop() pushes the audio_end frame; flush it out before
                // dropping the socket
                capture.stop();
                while let Ok(frame) = frames.try_recv() {
                    let _ = send_frame(&mut sink, &frame).await;
                }
                break;
            }
        }
    }

    capture.stop();
    let _ = sink.close().await;
    Ok(())
}

async fn send_frame(
    sink: &mut (impl futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin),
    frame: &ClientMessage,
) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    sink.send(Message::Text(text))
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

/// React to one server message; returns false when the conversation is over
fn handle_server(playback: &PlaybackPipeline, msg: ServerMessage) -> bool {
    match msg {
        ServerMessage::SessionOpen => tracing::info!("session open"),
        ServerMessage::Audio { data } => match decode_base64(&data) {
            Ok(chunk) => playback.enqueue(&chunk),
            Err(e) => tracing::warn!(error = %e, "undecodable audio chunk"),
        },
        ServerMessage::Interrupted => {
            playback.flush();
            tracing::debug!("interrupted, playback queue flushed");
        }
        ServerMessage::TurnComplete => tracing::debug!("turn complete"),
        ServerMessage::InputStt { text } => println!("you: {text}"),
        ServerMessage::OutputStt { text } => println!("model: {text}"),
        ServerMessage::SessionClosed => {
            tracing::info!("upstream session closed");
            return false;
        }
        ServerMessage::Error { message } => tracing::warn!(message = %message, "server error"),
    }
    true
}
