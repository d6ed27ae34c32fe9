//! Resilient client transport.
//!
//! Keeps one downstream stream open to the gateway, reconnecting with
//! exponential backoff when it drops. Upstream messages sent while offline
//! wait in a bounded queue and are flushed, in order, once a connection opens.

use crate::backoff::Backoff;
use crate::connector::{ByteStream, Connector, HttpConnector};
use crate::error::Result;
use freesail_core::config::{Config, TransportConfig};
use freesail_core::protocol::{DownstreamMessage, InboundFrame, StreamParser, UpstreamMessage};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Something observers of the transport may want to know.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    StateChanged(TransportState),

    /// The gateway announced the session id for this connection.
    SessionStarted(String),

    /// A protocol frame arrived.
    Message(DownstreamMessage),

    ReconnectScheduled { delay: Duration, attempt: u32 },

    /// The offline queue was full and the message was discarded.
    Dropped(UpstreamMessage),

    /// A recoverable failure: parse error, failed send, failed ping.
    Error(String),
}

/// What happened to a message passed to [`ResilientTransport::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Queued,
    Dropped,
    Failed,
}

struct Shared {
    state: TransportState,
    session_id: Option<String>,
    queue: VecDeque<UpstreamMessage>,
    backoff: Backoff,
    closed_by_caller: bool,

    /// A task is draining the queue; new sends join its tail.
    flushing: bool,

    /// Bumped on every connection attempt and on disconnect; tasks holding
    /// an older value stop touching shared state.
    generation: u64,

    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    ping: Option<JoinHandle<()>>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    max_buffer_bytes: usize,
    shared: Mutex<Shared>,
    events: broadcast::Sender<TransportEvent>,
}

/// Client half of the gateway connection.
///
/// Dropping the transport disconnects it.
pub struct ResilientTransport {
    inner: Arc<Inner>,
}

impl ResilientTransport {
    /// Create a transport over `connector`.
    pub fn new(connector: Arc<dyn Connector>, config: TransportConfig, max_buffer_bytes: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Shared {
            state: TransportState::Disconnected,
            session_id: None,
            queue: VecDeque::new(),
            backoff: Backoff::from_config(&config),
            closed_by_caller: false,
            flushing: false,
            generation: 0,
            reader: None,
            reconnect: None,
            ping: None,
        };

        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                max_buffer_bytes,
                shared: Mutex::new(shared),
                events,
            }),
        }
    }

    /// HTTP transport configured from the `transport` and `codec` sections.
    pub fn http(config: &Config) -> Result<Self> {
        let connector = HttpConnector::new(&config.transport.base_url)?;
        Ok(Self::new(
            Arc::new(connector),
            config.transport.clone(),
            config.codec.max_buffer_bytes,
        ))
    }

    pub fn state(&self) -> TransportState {
        self.inner.shared.lock().state
    }

    /// Session id of the current connection, once known.
    pub fn session_id(&self) -> Option<String> {
        self.inner.shared.lock().session_id.clone()
    }

    /// Messages waiting for a connection.
    pub fn queued(&self) -> usize {
        self.inner.shared.lock().queue.len()
    }

    /// Subscribe to transport events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    /// Open the connection. Does nothing while connected or connecting.
    ///
    /// A failed attempt is not returned as an error; it schedules a
    /// reconnect when auto-reconnect is enabled.
    pub async fn connect(&self) {
        let generation = {
            let mut shared = self.inner.shared.lock();
            if matches!(
                shared.state,
                TransportState::Connected | TransportState::Connecting
            ) {
                return;
            }
            shared.closed_by_caller = false;
            if let Some(pending) = shared.reconnect.take() {
                pending.abort();
            }
            shared.generation += 1;
            self.inner.set_state(&mut shared, TransportState::Connecting);
            shared.generation
        };

        self.inner.open(generation).await;
    }

    /// Deliver a message now, or queue it while offline.
    ///
    /// While older messages are still queued the message joins the tail and
    /// the queue is flushed, so delivery keeps arrival order. Failures are
    /// reported as [`TransportEvent::Error`] rather than returned.
    pub async fn send(&self, message: UpstreamMessage) -> SendOutcome {
        match self.inner.route(message) {
            Route::Done(outcome) => outcome,
            Route::Flush(generation) => {
                if self.inner.flush(generation).await {
                    SendOutcome::Delivered
                } else {
                    SendOutcome::Queued
                }
            }
            Route::Direct(session_id, message) => {
                match self
                    .inner
                    .connector
                    .send(session_id.as_deref(), &message)
                    .await
                {
                    Ok(()) => SendOutcome::Delivered,
                    Err(e) => {
                        warn!("Failed to send message: {}", e);
                        self.inner.emit(TransportEvent::Error(format!("send failed: {}", e)));
                        SendOutcome::Failed
                    }
                }
            }
        }
    }

    /// Close the connection and cancel every timer. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut shared = self.inner.shared.lock();
        shared.closed_by_caller = true;
        shared.flushing = false;
        shared.generation += 1;
        let tasks = [
            shared.reader.take(),
            shared.reconnect.take(),
            shared.ping.take(),
        ];
        for task in tasks.into_iter().flatten() {
            task.abort();
        }
        shared.session_id = None;
        self.inner.set_state(&mut shared, TransportState::Disconnected);
    }
}

impl Drop for ResilientTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

enum Route {
    Done(SendOutcome),
    Direct(Option<String>, UpstreamMessage),
    Flush(u64),
}

impl Inner {
    fn emit(&self, event: TransportEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, shared: &mut Shared, state: TransportState) {
        if shared.state != state {
            debug!("Transport {} -> {}", shared.state, state);
            shared.state = state;
            self.emit(TransportEvent::StateChanged(state));
        }
    }

    fn enqueue(&self, shared: &mut Shared, message: UpstreamMessage) -> SendOutcome {
        if shared.queue.len() >= self.config.max_queue {
            warn!(
                "Offline queue full ({} messages), dropping message for surface '{}'",
                self.config.max_queue,
                message.surface_id()
            );
            self.emit(TransportEvent::Dropped(message));
            return SendOutcome::Dropped;
        }
        shared.queue.push_back(message);
        SendOutcome::Queued
    }

    fn route(&self, message: UpstreamMessage) -> Route {
        let mut shared = self.shared.lock();
        if shared.state != TransportState::Connected || shared.flushing {
            return Route::Done(self.enqueue(&mut shared, message));
        }
        if shared.queue.is_empty() {
            return Route::Direct(shared.session_id.clone(), message);
        }
        match self.enqueue(&mut shared, message) {
            SendOutcome::Queued => {
                shared.flushing = true;
                Route::Flush(shared.generation)
            }
            outcome => Route::Done(outcome),
        }
    }

    /// Take the flush if the queue has work and no other task holds it.
    fn begin_flush(&self, shared: &mut Shared) -> bool {
        if shared.flushing || shared.queue.is_empty() || shared.state != TransportState::Connected {
            return false;
        }
        shared.flushing = true;
        true
    }

    async fn open(self: &Arc<Self>, generation: u64) {
        let connection = match self.connector.open(&self.config.catalogs).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                self.emit(TransportEvent::Error(e.to_string()));
                self.connection_lost(generation);
                return;
            }
        };

        let pending = {
            let mut shared = self.shared.lock();
            if shared.generation != generation || shared.closed_by_caller {
                return;
            }
            shared.session_id = connection.session_id;
            shared.backoff.reset();
            shared.flushing = false;
            self.set_state(&mut shared, TransportState::Connected);
            shared.reader = Some(self.spawn_reader(connection.frames, generation));
            shared.ping = self.spawn_ping(generation);
            self.begin_flush(&mut shared).then_some(shared.queue.len())
        };

        info!("Transport connected");
        if let Some(count) = pending {
            debug!("Flushing {} queued message(s)", count);
            self.flush(generation).await;
        }
    }

    /// Flush queued messages from the head until the queue is empty.
    ///
    /// The caller must hold the flush (`flushing` set). Failed messages go
    /// back on the tail; the flush gives up once every queued message has
    /// failed in a row. Returns whether the queue was emptied.
    async fn flush(&self, generation: u64) -> bool {
        let mut failures = 0;
        loop {
            let (message, session_id) = {
                let mut shared = self.shared.lock();
                if shared.generation != generation {
                    return false;
                }
                let pending = shared.queue.len();
                let next = if failures < pending {
                    shared.queue.pop_front()
                } else {
                    None
                };
                match next {
                    Some(message) => (message, shared.session_id.clone()),
                    None => {
                        shared.flushing = false;
                        return pending == 0;
                    }
                }
            };

            match self.connector.send(session_id.as_deref(), &message).await {
                Ok(()) => failures = 0,
                Err(e) => {
                    warn!("Failed to flush queued message: {}", e);
                    self.emit(TransportEvent::Error(format!("send failed: {}", e)));
                    failures += 1;
                    let mut shared = self.shared.lock();
                    self.enqueue(&mut shared, message);
                }
            }
        }
    }

    /// Flush whatever is still queued, unless a flush is already running.
    async fn retry_pending(&self, generation: u64) {
        let start = {
            let mut shared = self.shared.lock();
            shared.generation == generation && self.begin_flush(&mut shared)
        };
        if start {
            debug!("Retrying queued messages");
            self.flush(generation).await;
        }
    }

    /// Tear down the current connection and, unless the caller closed the
    /// transport, schedule the next attempt.
    fn connection_lost(self: &Arc<Self>, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            return;
        }
        if let Some(ping) = shared.ping.take() {
            ping.abort();
        }
        shared.reader = None;
        shared.session_id = None;
        shared.flushing = false;

        if !self.config.auto_reconnect || shared.closed_by_caller {
            self.set_state(&mut shared, TransportState::Disconnected);
            return;
        }

        let delay = shared.backoff.next_delay();
        let attempt = shared.backoff.attempt();
        self.set_state(&mut shared, TransportState::Reconnecting);
        info!("Reconnecting in {:?} (attempt {})", delay, attempt);
        self.emit(TransportEvent::ReconnectScheduled { delay, attempt });
        shared.reconnect = Some(self.schedule_reconnect(delay, generation));
    }

    fn schedule_reconnect(self: &Arc<Self>, delay: Duration, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.reconnect(generation).await;
        })
    }

    async fn reconnect(self: &Arc<Self>, generation: u64) {
        let generation = {
            let mut shared = self.shared.lock();
            if shared.generation != generation || shared.closed_by_caller {
                return;
            }
            shared.reconnect = None;
            shared.generation += 1;
            self.set_state(&mut shared, TransportState::Connecting);
            shared.generation
        };
        self.open(generation).await;
    }

    fn spawn_reader(self: &Arc<Self>, frames: ByteStream, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.read_frames(frames, generation).await })
    }

    async fn read_frames(self: Arc<Self>, mut frames: ByteStream, generation: u64) {
        let mut parser = StreamParser::new(self.max_buffer_bytes);

        let reason = loop {
            match frames.next().await {
                Some(Ok(chunk)) => {
                    let output = parser.parse_bytes(&chunk);
                    for error in output.errors {
                        warn!("Discarding downstream data: {}", error);
                        self.emit(TransportEvent::Error(error.to_string()));
                    }
                    for frame in output.messages {
                        self.handle_frame(frame, generation);
                    }
                }
                Some(Err(e)) => break e.to_string(),
                None => break "stream closed".to_string(),
            }
        };

        parser.reset();
        info!("Connection lost: {}", reason);
        self.connection_lost(generation);
    }

    fn handle_frame(&self, frame: InboundFrame, generation: u64) {
        match frame {
            InboundFrame::Handshake(handshake) => {
                let mut shared = self.shared.lock();
                if shared.generation != generation {
                    return;
                }
                debug!("Session started: {}", handshake.session_id);
                shared.session_id = Some(handshake.session_id.clone());
                self.emit(TransportEvent::SessionStarted(handshake.session_id));
            }
            InboundFrame::Message(message) => self.emit(TransportEvent::Message(message)),
        }
    }

    fn spawn_ping(self: &Arc<Self>, generation: u64) -> Option<JoinHandle<()>> {
        if self.config.ping_interval_ms == 0 {
            return None;
        }
        let period = Duration::from_millis(self.config.ping_interval_ms);
        let inner = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let session_id = {
                    let shared = inner.shared.lock();
                    if shared.generation != generation {
                        break;
                    }
                    shared.session_id.clone()
                };
                let Some(session_id) = session_id else {
                    continue;
                };
                match inner.connector.ping(&session_id).await {
                    Ok(()) => inner.retry_pending(generation).await,
                    Err(e) => {
                        debug!("Keep-alive ping failed: {}", e);
                        inner.emit(TransportEvent::Error(format!("ping failed: {}", e)));
                    }
                }
            }
        }))
    }
}
