//! Shared test doubles for voicelink integration tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use voicelink_gateway::upstream::{
    LiveEngine, LiveSession, RealtimeInput, SessionConfig, SessionEvent,
};
use voicelink_gateway::{Error, Result};

/// Scripted upstream engine: emits a fixed event sequence on connect and
/// records everything sent back to it.
pub struct FakeEngine {
    script: Vec<SessionEvent>,
    fail_connect: bool,
    sent: Arc<Mutex<Vec<RealtimeInput>>>,
    closes: Arc<AtomicUsize>,
    connects: AtomicUsize,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

impl FakeEngine {
    pub fn new(script: Vec<SessionEvent>) -> Self {
        Self {
            script,
            fail_connect: false,
            sent: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
            connects: AtomicUsize::new(0),
            events: Mutex::new(None),
        }
    }

    /// An engine whose connect always fails
    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::new(Vec::new())
        }
    }

    /// Push an extra event into the currently open session
    #[allow(dead_code)]
    pub async fn emit(&self, event: SessionEvent) {
        let tx = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("no open session");
        tx.send(event).await.expect("event receiver dropped");
    }

    /// Inputs the relay forwarded upstream, in order
    pub fn sent_inputs(&self) -> Vec<RealtimeInput> {
        self.sent.lock().unwrap().clone()
    }

    /// How many times the upstream session was closed
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// How many sessions were opened
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveEngine for FakeEngine {
    async fn connect(
        &self,
        _config: &SessionConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(Error::Upstream("connect refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        for event in self.script.clone() {
            tx.send(event).await.expect("scripted event overflow");
        }
        *self.events.lock().unwrap() = Some(tx.clone());

        let session = FakeSession {
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
            _events: tx,
        };
        Ok((Box::new(session), rx))
    }
}

/// Records forwarded inputs; keeps the event channel open while alive
struct FakeSession {
    sent: Arc<Mutex<Vec<RealtimeInput>>>,
    closes: Arc<AtomicUsize>,
    _events: mpsc::Sender<SessionEvent>,
}

#[async_trait]
impl LiveSession for FakeSession {
    async fn send(&mut self, input: RealtimeInput) -> Result<()> {
        self.sent.lock().unwrap().push(input);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
