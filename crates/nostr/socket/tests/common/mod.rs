//! Shared test harness: an in-memory transport that plays the relay.
#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use nostr_socket::{
    Frame, FrameWriter, NostrSocketClient, Result, Session, SocketConfig, SocketError, Transport,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Config that ignores the environment.
pub fn test_config() -> SocketConfig {
    SocketConfig::default()
        .with_compression(false)
        .with_eose_delay(Duration::from_millis(50))
        .with_request_timeout(Duration::from_secs(2))
}

/// Transport whose sessions are driven by [`FakeRelay`] handles.
pub struct FakeTransport {
    attempts: AtomicUsize,
    connect_delay: Duration,
    failure: Mutex<Option<SocketError>>,
    relays_tx: mpsc::UnboundedSender<FakeRelay>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeRelay>) {
        Self::with_delay(Duration::ZERO)
    }

    /// Every connect sleeps for `delay` before resolving.
    pub fn with_delay(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<FakeRelay>) {
        let (relays_tx, relays_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            attempts: AtomicUsize::new(0),
            connect_delay: delay,
            failure: Mutex::new(None),
            relays_tx,
        });
        (transport, relays_rx)
    }

    /// Make every following connect fail with `error` (or succeed with `None`).
    pub fn set_failure(&self, error: Option<SocketError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, url: &str) -> Result<Session> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        let failure = self.failure.lock().unwrap().clone();
        if let Some(err) = failure {
            return Err(err);
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel::<Result<Frame>>();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let fail_sends = Arc::new(AtomicBool::new(false));

        let relay = FakeRelay {
            url: url.to_string(),
            frames: frames_tx,
            sent: sent_rx,
            closed: Arc::clone(&closed),
            fail_sends: Arc::clone(&fail_sends),
        };
        let _ = self.relays_tx.send(relay);

        let frames = futures::stream::unfold(frames_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        })
        .boxed();

        Ok(Session {
            writer: Box::new(FakeWriter {
                sent: sent_tx,
                closed,
                fail_sends,
            }),
            frames,
        })
    }
}

struct FakeWriter {
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl FrameWriter for FakeWriter {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SocketError::Network("write failed".to_string()));
        }
        self.sent
            .send(text)
            .map_err(|_| SocketError::Network("relay gone".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Relay end of one fake session.
///
/// Dropping the handle ends the client's frame stream.
pub struct FakeRelay {
    pub url: String,
    frames: mpsc::UnboundedSender<Result<Frame>>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl FakeRelay {
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.frames.send(Ok(Frame::Text(text.into())));
    }

    pub fn push_binary(&self, data: Vec<u8>) {
        let _ = self.frames.send(Ok(Frame::Binary(data)));
    }

    pub fn push_close(&self) {
        let _ = self.frames.send(Ok(Frame::Close));
    }

    pub fn push_error(&self, error: SocketError) {
        let _ = self.frames.send(Err(error));
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Next frame the client wrote.
    pub async fn next_sent(&mut self) -> String {
        timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .expect("client sent nothing")
            .expect("writer dropped")
    }

    /// Next frame the client wrote, parsed.
    pub async fn next_sent_json(&mut self) -> Value {
        serde_json::from_str(&self.next_sent().await).unwrap()
    }

    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Records connection callbacks for later assertions.
pub struct CallbackLog {
    pub opened: mpsc::UnboundedReceiver<String>,
    pub closed: mpsc::UnboundedReceiver<(String, Option<SocketError>)>,
}

impl CallbackLog {
    pub async fn next_closed(&mut self) -> (String, Option<SocketError>) {
        timeout(Duration::from_secs(5), self.closed.recv())
            .await
            .expect("on_closed never fired")
            .expect("callback dropped")
    }
}

pub fn client_with(transport: Arc<FakeTransport>, config: SocketConfig) -> NostrSocketClient {
    NostrSocketClient::builder("wss://relay.test")
        .config(config)
        .transport(transport)
        .build()
        .unwrap()
}

pub fn client_with_callbacks(
    transport: Arc<FakeTransport>,
    config: SocketConfig,
) -> (NostrSocketClient, CallbackLog) {
    let (opened_tx, opened) = mpsc::unbounded_channel();
    let (closed_tx, closed) = mpsc::unbounded_channel();
    let client = NostrSocketClient::builder("wss://relay.test")
        .config(config)
        .transport(transport)
        .on_opened(move |url| {
            let _ = opened_tx.send(url.to_string());
        })
        .on_closed(move |url, err| {
            let _ = closed_tx.send((url.to_string(), err.cloned()));
        })
        .build()
        .unwrap();
    (client, CallbackLog { opened, closed })
}

/// A well-formed kind-1 event object.
pub fn note_json(id: &str) -> Value {
    json!({
        "id": id,
        "pubkey": "f".repeat(64),
        "created_at": 1_700_000_000u64,
        "kind": 1,
        "tags": [],
        "content": "hello",
        "sig": "a".repeat(128),
    })
}
