//! Session manager integration tests
//!
//! Drive the relay against a scripted fake engine, without sockets or
//! audio hardware.

mod common;

use std::sync::Arc;

use common::FakeEngine;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use voicelink_gateway::protocol::ServerMessage;
use voicelink_gateway::session::run_session;
use voicelink_gateway::upstream::{
    INPUT_MIME, RealtimeInput, ServerContent, SessionConfig, SessionEvent,
};

fn test_config() -> SessionConfig {
    SessionConfig {
        model: "test-model".to_string(),
        system_instruction: "stay on topic".to_string(),
    }
}

fn audio_content(data: &str) -> SessionEvent {
    SessionEvent::Content(ServerContent {
        audio: Some(data.to_string()),
        ..Default::default()
    })
}

/// Spawn the relay over channel pairs, as the websocket handler does
fn spawn_relay(
    engine: &Arc<FakeEngine>,
) -> (
    mpsc::Sender<String>,
    mpsc::Receiver<ServerMessage>,
    JoinHandle<voicelink_gateway::Result<()>>,
) {
    let (in_tx, in_rx) = mpsc::channel(16);
    let (out_tx, out_rx) = mpsc::channel(64);
    let engine = Arc::clone(engine);
    let handle = tokio::spawn(async move {
        run_session(engine.as_ref(), &test_config(), in_rx, out_tx).await
    });
    (in_tx, out_rx, handle)
}

/// Drain the outbound channel until the relay drops its sender
async fn collect(mut out_rx: mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Some(msg) = out_rx.recv().await {
        messages.push(msg);
    }
    messages
}

#[tokio::test]
async fn channel_close_closes_upstream_exactly_once() {
    let engine = Arc::new(FakeEngine::new(vec![SessionEvent::Open]));
    let (in_tx, mut out_rx, handle) = spawn_relay(&engine);

    assert_eq!(out_rx.recv().await, Some(ServerMessage::SessionOpen));

    drop(in_tx);
    handle.await.unwrap().unwrap();

    assert_eq!(collect(out_rx).await, Vec::<ServerMessage>::new());
    assert_eq!(engine.connect_count(), 1);
    // close runs on the channel-close path and again on relay exit; the
    // guard must collapse that to one upstream close
    assert_eq!(engine.close_count(), 1);
}

#[tokio::test]
async fn open_failure_emits_single_error_then_nothing() {
    let engine = Arc::new(FakeEngine::failing());
    let (in_tx, out_rx, handle) = spawn_relay(&engine);

    assert!(handle.await.unwrap().is_err());

    let messages = collect(out_rx).await;
    assert_eq!(messages.len(), 1);
    assert!(matches!(messages[0], ServerMessage::Error { .. }));

    // the relay is gone: nothing can be forwarded to the absent session
    assert!(in_tx.send(r#"{"type":"audio_end"}"#.to_string()).await.is_err());
    assert!(engine.sent_inputs().is_empty());
    assert_eq!(engine.close_count(), 0);
}

#[tokio::test]
async fn validation_failure_is_nonfatal() {
    let engine = Arc::new(FakeEngine::new(vec![SessionEvent::Open]));
    let (in_tx, mut out_rx, handle) = spawn_relay(&engine);

    assert_eq!(out_rx.recv().await, Some(ServerMessage::SessionOpen));

    // below the 8-char payload floor: rejected, connection survives
    in_tx
        .send(r#"{"type":"audio","data":"x"}"#.to_string())
        .await
        .unwrap();
    assert!(matches!(
        out_rx.recv().await,
        Some(ServerMessage::Error { .. })
    ));

    // a subsequent valid frame still goes through
    in_tx
        .send(r#"{"type":"audio","data":"AAAAAAAAAAAA"}"#.to_string())
        .await
        .unwrap();

    drop(in_tx);
    handle.await.unwrap().unwrap();

    assert_eq!(
        engine.sent_inputs(),
        vec![RealtimeInput::Audio {
            data: "AAAAAAAAAAAA".to_string(),
            mime_type: INPUT_MIME.to_string(),
        }]
    );
}

#[tokio::test]
async fn upstream_events_relay_in_arrival_order() {
    let engine = Arc::new(FakeEngine::new(vec![
        SessionEvent::Open,
        audio_content("Q0hVTksx"),
        SessionEvent::Content(ServerContent {
            interrupted: true,
            ..Default::default()
        }),
        audio_content("Q0hVTksy"),
        SessionEvent::Closed,
    ]));
    let (_in_tx, out_rx, handle) = spawn_relay(&engine);

    handle.await.unwrap().unwrap();

    assert_eq!(
        collect(out_rx).await,
        vec![
            ServerMessage::SessionOpen,
            ServerMessage::Audio {
                data: "Q0hVTksx".to_string()
            },
            ServerMessage::Interrupted,
            ServerMessage::Audio {
                data: "Q0hVTksy".to_string()
            },
            ServerMessage::SessionClosed,
        ]
    );
}

#[tokio::test]
async fn one_event_fans_out_in_field_order() {
    let engine = Arc::new(FakeEngine::new(vec![
        SessionEvent::Open,
        SessionEvent::Content(ServerContent {
            audio: Some("UENN".to_string()),
            interrupted: true,
            input_transcription: Some("you".to_string()),
            output_transcription: Some("model".to_string()),
            turn_complete: true,
        }),
        SessionEvent::Closed,
    ]));
    let (_in_tx, out_rx, handle) = spawn_relay(&engine);

    handle.await.unwrap().unwrap();

    assert_eq!(
        collect(out_rx).await,
        vec![
            ServerMessage::SessionOpen,
            ServerMessage::Audio {
                data: "UENN".to_string()
            },
            ServerMessage::Interrupted,
            ServerMessage::InputStt {
                text: "you".to_string()
            },
            ServerMessage::OutputStt {
                text: "model".to_string()
            },
            ServerMessage::TurnComplete,
            ServerMessage::SessionClosed,
        ]
    );
}

#[tokio::test]
async fn inbound_modalities_forward_and_cancel_is_inert() {
    let engine = Arc::new(FakeEngine::new(vec![SessionEvent::Open]));
    let (in_tx, _out_rx, handle) = spawn_relay(&engine);

    for frame in [
        r#"{"type":"audio","data":"AAAAAAAAAAAA"}"#,
        r#"{"type":"audio_end"}"#,
        r#"{"type":"text","text":"hello"}"#,
        r#"{"type":"cancel"}"#,
    ] {
        in_tx.send(frame.to_string()).await.unwrap();
    }

    drop(in_tx);
    handle.await.unwrap().unwrap();

    assert_eq!(
        engine.sent_inputs(),
        vec![
            RealtimeInput::Audio {
                data: "AAAAAAAAAAAA".to_string(),
                mime_type: INPUT_MIME.to_string(),
            },
            RealtimeInput::AudioStreamEnd,
            RealtimeInput::Text("hello".to_string()),
        ]
    );
}

#[tokio::test]
async fn upstream_close_emits_session_closed_without_close_call() {
    let engine = Arc::new(FakeEngine::new(vec![SessionEvent::Open, SessionEvent::Closed]));
    let (_in_tx, out_rx, handle) = spawn_relay(&engine);

    handle.await.unwrap().unwrap();

    assert_eq!(
        collect(out_rx).await,
        vec![ServerMessage::SessionOpen, ServerMessage::SessionClosed]
    );
    // the upstream ended on its own; no close call is owed
    assert_eq!(engine.close_count(), 0);
}

#[tokio::test]
async fn upstream_error_becomes_error_frame() {
    let engine = Arc::new(FakeEngine::new(vec![
        SessionEvent::Open,
        SessionEvent::Error("quota exceeded".to_string()),
        SessionEvent::Closed,
    ]));
    let (_in_tx, out_rx, handle) = spawn_relay(&engine);

    handle.await.unwrap().unwrap();

    assert_eq!(
        collect(out_rx).await,
        vec![
            ServerMessage::SessionOpen,
            ServerMessage::Error {
                message: "quota exceeded".to_string()
            },
            ServerMessage::SessionClosed,
        ]
    );
}
