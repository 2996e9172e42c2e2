//! Single relay socket connection
//!
//! [`NostrSocketClient`] owns at most one live WebSocket session to a relay.
//! The session is opened lazily by [`NostrSocketClient::ensure_connected`]
//! and shared by every sender. A background receive loop parses relay frames
//! and republishes them to any number of subscribers, each with its own
//! unbounded queue, optionally filtered by subscription id.

use crate::compression::{inflate, negotiation_frame};
use crate::config::SocketConfig;
use crate::error::{Result, SocketError};
use crate::event::{Event, ExtensionEvent};
use crate::incoming::{IncomingMessage, parse};
use crate::kind::{DefaultKindClassifier, KindClassifier};
use crate::logging::{Direction, log_frame};
use crate::message::{build_auth, build_close, build_count, build_event, build_req};
use crate::socket_url::normalize_socket_url;
use crate::subscription::{
    Fanout, IncomingStream, SubscriptionReceiver, generate_subscription_id,
};
use crate::transport::{
    Frame, FrameStream, FrameWriter, Session, Transport, TungsteniteTransport,
};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// Called with the relay URL once a session is open.
pub type OpenedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with the relay URL when a session ends on its own or fails to
/// open. The error is `None` when the relay closed the socket cleanly.
pub type ClosedCallback = Arc<dyn Fn(&str, Option<&SocketError>) + Send + Sync>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live session
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Session open, receive loop running
    Connected,
}

/// Relay verdict on a published event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfirmation {
    /// Event ID that was published
    pub event_id: String,
    /// Whether the relay accepted the event
    pub accepted: bool,
    /// Message from the relay, if any
    pub message: Option<String>,
}

/// Everything a one-shot query returned before EOSE
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub events: Vec<Event>,
    pub extension_events: Vec<ExtensionEvent>,
}

/// A live session. Never reused once `alive` drops to false.
struct LiveSession {
    writer: Mutex<Box<dyn FrameWriter>>,
    alive: Arc<AtomicBool>,
    recv_task: JoinHandle<()>,
}

impl LiveSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Outcome of the most recent finished connection attempt.
#[derive(Default)]
struct AttemptLog {
    finished: u64,
    last_error: Option<SocketError>,
}

/// Raises the `connecting` flag for its lifetime, including when the
/// connecting future is dropped mid-handshake.
struct ConnectingFlag<'a>(&'a AtomicBool);

impl<'a> ConnectingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ConnectingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    url: String,
    config: SocketConfig,
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn KindClassifier>,
    on_opened: Option<OpenedCallback>,
    on_closed: Option<ClosedCallback>,
    fanout: Fanout,
    /// Held for the whole connect and close paths
    connect_lock: Mutex<AttemptLog>,
    /// Mirror of `AttemptLog::finished`, readable without the lock
    finished_attempts: AtomicU64,
    connecting: AtomicBool,
    session: RwLock<Option<Arc<LiveSession>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.alive.store(false, Ordering::SeqCst);
            session.recv_task.abort();
        }
    }
}

/// Builder for [`NostrSocketClient`]
pub struct NostrSocketClientBuilder {
    url: String,
    config: SocketConfig,
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn KindClassifier>,
    on_opened: Option<OpenedCallback>,
    on_closed: Option<ClosedCallback>,
}

impl NostrSocketClientBuilder {
    /// Use `config` instead of [`SocketConfig::default`].
    pub fn config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the WebSocket transport (tests use an in-memory one).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Replace the kind classifier used by the parser.
    pub fn classifier(mut self, classifier: Arc<dyn KindClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Called after every successful open, once negotiation is done.
    pub fn on_opened(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_opened = Some(Arc::new(callback));
        self
    }

    /// Called when a session ends on its own or an open attempt fails.
    /// Not called for [`NostrSocketClient::close`].
    pub fn on_closed(
        mut self,
        callback: impl Fn(&str, Option<&SocketError>) + Send + Sync + 'static,
    ) -> Self {
        self.on_closed = Some(Arc::new(callback));
        self
    }

    /// Normalize the URL and create the client. Does not connect.
    pub fn build(self) -> Result<NostrSocketClient> {
        let url = normalize_socket_url(&self.url)?;
        Ok(NostrSocketClient {
            inner: Arc::new(Inner {
                url,
                config: self.config,
                transport: self.transport,
                classifier: self.classifier,
                on_opened: self.on_opened,
                on_closed: self.on_closed,
                fanout: Fanout::default(),
                connect_lock: Mutex::new(AttemptLog::default()),
                finished_attempts: AtomicU64::new(0),
                connecting: AtomicBool::new(false),
                session: RwLock::new(None),
            }),
        })
    }
}

/// Client for one relay endpoint
#[derive(Clone)]
pub struct NostrSocketClient {
    inner: Arc<Inner>,
}

impl NostrSocketClient {
    /// Create a client with default config (does not connect yet)
    pub fn new(url: &str) -> Result<Self> {
        Self::builder(url).build()
    }

    /// Create a client with custom config
    pub fn with_config(url: &str, config: SocketConfig) -> Result<Self> {
        Self::builder(url).config(config).build()
    }

    /// Start building a client with custom transport, classifier or callbacks
    pub fn builder(url: &str) -> NostrSocketClientBuilder {
        NostrSocketClientBuilder {
            url: url.to_string(),
            config: SocketConfig::default(),
            transport: Arc::new(TungsteniteTransport),
            classifier: Arc::new(DefaultKindClassifier),
            on_opened: None,
            on_closed: None,
        }
    }

    /// Normalized relay URL
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Config this client was built with
    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    /// Get current connection state
    pub async fn state(&self) -> ConnectionState {
        if self.inner.connecting.load(Ordering::SeqCst) {
            ConnectionState::Connecting
        } else if self.live_session().await.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Check if connected
    pub async fn is_connected(&self) -> bool {
        self.live_session().await.is_some()
    }

    /// Every parsed relay message from now on, in wire order.
    ///
    /// Each stream buffers independently and without bound; a slow reader
    /// neither loses messages nor slows down the connection. Drop the stream
    /// to unsubscribe.
    pub fn incoming_messages(&self) -> IncomingStream {
        self.inner.fanout.subscribe()
    }

    /// Receiver for the messages of one subscription id.
    pub fn subscribe_to(&self, subscription_id: &str) -> SubscriptionReceiver {
        SubscriptionReceiver::new(subscription_id.to_string(), self.incoming_messages())
    }

    /// Make sure a live session exists, opening one if needed.
    ///
    /// Concurrent callers share a single connection attempt: whoever takes
    /// the lock first connects, the rest observe its outcome.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.live_session().await.is_some() {
            return Ok(());
        }

        let observed = self.inner.finished_attempts.load(Ordering::SeqCst);
        let mut log = self.inner.connect_lock.lock().await;

        if self.live_session().await.is_some() {
            return Ok(());
        }
        if log.finished != observed
            && let Some(err) = &log.last_error
        {
            return Err(err.clone());
        }

        let result = {
            let _connecting = ConnectingFlag::raise(&self.inner.connecting);
            self.open_session().await
        };

        log.finished += 1;
        log.last_error = result.as_ref().err().cloned();
        self.inner
            .finished_attempts
            .store(log.finished, Ordering::SeqCst);

        result
    }

    /// Open a transport session and start its receive loop.
    /// Caller holds `connect_lock`.
    ///
    /// Nothing is installed until the session is fully set up, so a caller
    /// dropping this future mid-handshake leaves no half-open session behind.
    async fn open_session(&self) -> Result<()> {
        let url = &self.inner.url;

        // Drop whatever is left of a dead session
        if let Some(stale) = self.inner.session.write().await.take() {
            stale.recv_task.abort();
        }

        info!("Connecting to relay: {}", url);
        let connect_start = std::time::Instant::now();

        let Session { mut writer, frames } = match self.inner.transport.connect(url).await {
            Ok(session) => session,
            Err(e) => {
                let err = match e {
                    SocketError::Network(_) => e,
                    other => SocketError::Network(other.to_string()),
                };
                warn!("Failed to connect to {}: {}", url, err);
                self.notify_closed(Some(&err));
                return Err(err);
            }
        };

        if self.inner.config.compression {
            let frame = negotiation_frame(&generate_subscription_id());
            if let Err(e) = self.send_on(writer.as_mut(), frame).await {
                warn!("Compression negotiation with {} failed: {}", url, e);
                self.notify_closed(Some(&e));
                return Err(e);
            }
        }

        // No await between spawning the receive loop and installing the session
        let mut slot = self.inner.session.write().await;
        let alive = Arc::new(AtomicBool::new(true));
        let recv_task = self.spawn_receive_loop(frames, Arc::clone(&alive));
        *slot = Some(Arc::new(LiveSession {
            writer: Mutex::new(writer),
            alive,
            recv_task,
        }));
        drop(slot);

        info!("Connected to relay: {} (took {:?})", url, connect_start.elapsed());
        if let Some(callback) = &self.inner.on_opened {
            callback(url);
        }
        Ok(())
    }

    fn spawn_receive_loop(&self, frames: FrameStream, alive: Arc<AtomicBool>) -> JoinHandle<()> {
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        tokio::spawn(publish_loop(publish_rx, self.inner.fanout.clone()));

        let ctx = ReceiveContext {
            url: self.inner.url.clone(),
            classifier: Arc::clone(&self.inner.classifier),
            eose_delay: self.inner.config.eose_delay,
            log_chunk_size: self.inner.config.log_chunk_size,
            on_closed: self.inner.on_closed.clone(),
            alive,
            publish_tx,
        };
        tokio::spawn(receive_loop(frames, ctx))
    }

    fn notify_closed(&self, error: Option<&SocketError>) {
        if let Some(callback) = &self.inner.on_closed {
            callback(&self.inner.url, error);
        }
    }

    async fn live_session(&self) -> Option<Arc<LiveSession>> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_alive())
            .cloned()
    }

    async fn write_frame(&self, session: &LiveSession, text: String) -> Result<()> {
        let mut writer = session.writer.lock().await;
        self.send_on(&mut **writer, text).await
    }

    async fn send_on(&self, writer: &mut dyn FrameWriter, text: String) -> Result<()> {
        log_frame(
            Direction::Outgoing,
            &self.inner.url,
            &text,
            self.inner.config.log_chunk_size,
        );
        writer.send_text(text).await.map_err(|e| {
            warn!("Failed to send to {}: {}", self.inner.url, e);
            match e {
                SocketError::Network(_) => e,
                other => SocketError::Network(other.to_string()),
            }
        })
    }

    /// Send raw frame text, connecting first if needed
    pub async fn send_text(&self, text: String) -> Result<()> {
        self.ensure_connected().await?;
        let session = self.live_session().await.ok_or_else(|| {
            SocketError::Network(format!("Not connected to relay: {}", self.inner.url))
        })?;
        self.write_frame(&session, text).await
    }

    /// Send `["REQ", subscription_id, filter]`
    pub async fn send_req(&self, subscription_id: &str, filter: &Value) -> Result<()> {
        self.send_text(build_req(subscription_id, filter)).await
    }

    /// Send `["COUNT", <new id>, filter]` and return the generated id
    pub async fn send_count(&self, filter: &Value) -> Result<String> {
        let subscription_id = generate_subscription_id();
        self.send_text(build_count(&subscription_id, filter)).await?;
        Ok(subscription_id)
    }

    /// Send `["CLOSE", subscription_id]`
    pub async fn send_close(&self, subscription_id: &str) -> Result<()> {
        self.send_text(build_close(subscription_id)).await
    }

    /// Send `["EVENT", event]`
    pub async fn send_event(&self, event: &Value) -> Result<()> {
        self.send_text(build_event(event)).await
    }

    /// Send `["AUTH", event]`
    pub async fn send_auth(&self, event: &Value) -> Result<()> {
        self.send_text(build_auth(event)).await
    }

    /// Open a subscription with a fresh id and return its receiver.
    ///
    /// The receiver exists before the REQ goes out, so no reply is missed.
    pub async fn subscribe(&self, filter: &Value) -> Result<SubscriptionReceiver> {
        let receiver = self.subscribe_to(&generate_subscription_id());
        self.send_req(receiver.id(), filter).await?;
        Ok(receiver)
    }

    /// Collect everything the relay has stored for `filter`.
    ///
    /// Sends REQ, gathers EVENT/EVENTS until EOSE, then sends CLOSE.
    pub async fn query(&self, filter: &Value) -> Result<QueryResult> {
        let mut receiver = self.subscribe(filter).await?;
        let subscription_id = receiver.id().to_string();

        let outcome: Result<QueryResult> = timeout(self.inner.config.request_timeout, async {
            let mut result = QueryResult::default();
            loop {
                match receiver.recv().await? {
                    IncomingMessage::Event {
                        event,
                        extension_event,
                        ..
                    } => {
                        result.events.extend(event);
                        result.extension_events.extend(extension_event);
                    }
                    IncomingMessage::Events {
                        events,
                        extension_events,
                        ..
                    } => {
                        result.events.extend(events);
                        result.extension_events.extend(extension_events);
                    }
                    IncomingMessage::Eose { .. } => return Ok(result),
                    IncomingMessage::Notice { message, .. } => {
                        return Err(SocketError::Relay(
                            message.unwrap_or_else(|| "request refused".to_string()),
                        ));
                    }
                    _ => {}
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            Err(SocketError::Timeout(format!(
                "No EOSE for {} after {:?}",
                subscription_id, self.inner.config.request_timeout
            )))
        });

        if let Err(e) = self.send_close(&subscription_id).await {
            debug!("Could not close query {}: {}", subscription_id, e);
        }
        outcome
    }

    /// Publish an event and wait for the relay's OK.
    pub async fn publish(&self, event: &Event) -> Result<PublishConfirmation> {
        let value = serde_json::to_value(event)?;
        let mut incoming = self.incoming_messages();
        self.send_event(&value).await?;

        timeout(self.inner.config.request_timeout, async {
            loop {
                match incoming.recv().await {
                    Some(IncomingMessage::Ok {
                        event_id,
                        success,
                        message,
                    }) if event_id == event.id => {
                        return Ok(PublishConfirmation {
                            event_id,
                            accepted: success,
                            message,
                        });
                    }
                    Some(_) => {}
                    None => return Err(SocketError::Closed),
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            Err(SocketError::Timeout(format!(
                "Event confirmation timeout after {:?}",
                self.inner.config.request_timeout
            )))
        })
    }

    /// Ask the relay how many events match `filter`.
    pub async fn count(&self, filter: &Value) -> Result<u64> {
        let mut receiver = self.subscribe_to(&generate_subscription_id());
        self.send_text(build_count(receiver.id(), filter)).await?;

        timeout(self.inner.config.request_timeout, async {
            loop {
                match receiver.recv().await? {
                    IncomingMessage::Count { count, .. } => return Ok(count),
                    IncomingMessage::Notice { message, .. } => {
                        return Err(SocketError::Relay(
                            message.unwrap_or_else(|| "count refused".to_string()),
                        ));
                    }
                    _ => {}
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            Err(SocketError::Timeout(format!(
                "No COUNT for {} after {:?}",
                receiver.id(),
                self.inner.config.request_timeout
            )))
        })
    }

    /// Close the session.
    ///
    /// Stops the receive loop, sends a normal-closure frame and returns to
    /// `Disconnected` whatever the close frame's fate. Never fails.
    pub async fn close(&self) {
        let _log = self.inner.connect_lock.lock().await;
        let Some(session) = self.inner.session.write().await.take() else {
            return;
        };

        info!("Disconnecting from relay: {}", self.inner.url);
        session.alive.store(false, Ordering::SeqCst);
        session.recv_task.abort();

        let mut writer = session.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!("Close frame to {} not delivered: {}", self.inner.url, e);
        }
        info!("Disconnected from relay: {}", self.inner.url);
    }
}

/// State the receive loop needs, detached from the client so the loop
/// never keeps the client alive.
struct ReceiveContext {
    url: String,
    classifier: Arc<dyn KindClassifier>,
    eose_delay: std::time::Duration,
    log_chunk_size: usize,
    on_closed: Option<ClosedCallback>,
    alive: Arc<AtomicBool>,
    publish_tx: mpsc::UnboundedSender<(Instant, IncomingMessage)>,
}

impl ReceiveContext {
    fn dispatch(&self, text: &str) {
        log_frame(Direction::Incoming, &self.url, text, self.log_chunk_size);

        let Some(msg) = parse(text, self.classifier.as_ref()) else {
            return;
        };
        // Hold EOSE back so events sent just before it reach subscribers first
        let due = if msg.is_eose() {
            Instant::now() + self.eose_delay
        } else {
            Instant::now()
        };
        if self.publish_tx.send((due, msg)).is_err() {
            debug!("Publisher for {} is gone, dropping message", self.url);
        }
    }
}

/// Read frames until the session ends. Aborting the task is the only way
/// to stop it early, and reports nothing to the closed callback.
async fn receive_loop(mut frames: FrameStream, ctx: ReceiveContext) {
    let outcome = loop {
        match frames.next().await {
            Some(Ok(Frame::Text(text))) => ctx.dispatch(&text),
            Some(Ok(Frame::Binary(data))) => match inflate(&data) {
                Ok(text) => ctx.dispatch(&text),
                Err(e) => break Some(e),
            },
            Some(Ok(Frame::Close)) => {
                info!("Relay {} closed connection", ctx.url);
                break None;
            }
            Some(Err(e)) => break Some(e),
            None => {
                info!("Relay {} stream ended", ctx.url);
                break None;
            }
        }
    };

    ctx.alive.store(false, Ordering::SeqCst);
    if let Some(e) = &outcome {
        warn!("Session with {} failed: {}", ctx.url, e);
    }
    if let Some(callback) = &ctx.on_closed {
        callback(&ctx.url, outcome.as_ref());
    }
}

/// Release parsed messages to subscribers in arrival order, each no earlier
/// than its due instant.
async fn publish_loop(
    mut rx: mpsc::UnboundedReceiver<(Instant, IncomingMessage)>,
    fanout: Fanout,
) {
    while let Some((due, msg)) = rx.recv().await {
        tokio::time::sleep_until(due).await;
        fanout.publish(msg);
    }
}
