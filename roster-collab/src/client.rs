//! Connection manager: one WebSocket at a time, kept alive and reconnected.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect, automatic reconnect with
//!   bounded exponential backoff)
//! - Keep-alive pings while open
//! - Inbound decode and fan-out through the [`DispatchRegistry`]
//! - A non-blocking `send` that only writes while the link is open
//!
//! ## Architecture
//!
//! ```text
//!  connect() / disconnect() / teardown()        timers (retry, keep-alive)
//!              │                                         │
//!              ▼                                         ▼
//!        ┌────────────────── input channel ─────────────────┐
//!        │                    actor task                     │
//!        │   Lifecycle ── generation check ── ActiveTransport│
//!        └───────────▲──────────────────────────────┬────────┘
//!                    │ Opened / Frame / Closed      │ Outbound
//!              ┌─────┴──────────────────────────────▼─────┐
//!              │       transport task (one per attempt)     │
//!              │   tokio-tungstenite reader + writer halves │
//!              └────────────────────────────────────────────┘
//! ```
//!
//! Every input is handled to completion before the next one is taken, so
//! lifecycle state, the transport slot and dispatch never run concurrently
//! with each other. Socket events and timers are tagged with the generation
//! of the attempt that produced them; the actor drops anything stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::dispatch::{DispatchRegistry, Subscription};
use crate::lifecycle::{CloseDecision, Generation, Lifecycle, LinkState};
use crate::protocol::WireMessage;

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connection established
    Opened,
    /// Connection lost or closed
    Closed,
    /// A retry is armed
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Every retry failed; no more automatic attempts until `connect()`
    ReconnectExhausted,
}

/// Anything that can put a message on the wire.
pub trait MessageSink: Send + Sync {
    /// Returns `false` when the message was not written.
    fn send_message(&self, message: &WireMessage) -> bool;
}

/// Connection statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub opens: u64,
    pub closes: u64,
    pub reconnect_attempts: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Inbound frames rejected by the codec
    pub frames_dropped: u64,
}

#[derive(Default)]
struct AtomicConnectionStats {
    opens: AtomicU64,
    closes: AtomicU64,
    reconnect_attempts: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
}

impl AtomicConnectionStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            opens: self.opens.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Requests from the actor to the transport task.
enum Outbound {
    Frame(String),
    Close,
}

/// What `send` needs to know, readable outside the actor.
struct Link {
    state: LinkState,
    /// Present only while the transport is open
    writer: Option<mpsc::UnboundedSender<Outbound>>,
}

struct Shared {
    link: Mutex<Link>,
    url: Mutex<String>,
    stats: AtomicConnectionStats,
}

impl Shared {
    fn new(url: String) -> Self {
        Self {
            link: Mutex::new(Link {
                state: LinkState::Idle,
                writer: None,
            }),
            url: Mutex::new(url),
            stats: AtomicConnectionStats::default(),
        }
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_link(&self, state: LinkState, writer: Option<mpsc::UnboundedSender<Outbound>>) {
        let mut link = self.link();
        link.state = state;
        link.writer = writer;
    }

    /// Publish an open writer unless a `disconnect()` is pending.
    fn open_link(&self, writer: mpsc::UnboundedSender<Outbound>) -> bool {
        let mut link = self.link();
        if link.state == LinkState::Closing {
            return false;
        }
        link.state = LinkState::Open;
        link.writer = Some(writer);
        true
    }

    /// Mark the link closing and drop the writer so `send` refuses at once.
    fn release_writer(&self) {
        let mut link = self.link();
        if matches!(link.state, LinkState::Connecting | LinkState::Open) {
            link.state = LinkState::Closing;
        }
        link.writer = None;
    }

    fn url(&self) -> String {
        self.url.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_url(&self, url: String) {
        *self.url.lock().unwrap_or_else(PoisonError::into_inner) = url;
    }

    fn send(&self, message: &WireMessage) -> bool {
        let link = self.link();
        let writer = match (&link.state, &link.writer) {
            (LinkState::Open, Some(writer)) => writer,
            (state, _) => {
                log::warn!(
                    "Not sending {} message: connection is {}",
                    message.kind(),
                    state.label()
                );
                return false;
            }
        };

        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                log::error!("Failed to encode {} message: {e}", message.kind());
                return false;
            }
        };

        if writer.send(Outbound::Frame(text)).is_err() {
            log::warn!("Not sending {} message: transport is gone", message.kind());
            return false;
        }
        AtomicConnectionStats::bump(&self.stats.frames_sent);
        log::trace!("Sent {} message", message.kind());
        true
    }
}

enum Input {
    Connect,
    Disconnect,
    Shutdown,
    Opened(Generation),
    Frame(Generation, String),
    Closed(Generation),
    RetryDue(Generation),
}

/// The connection manager.
///
/// Owns the only transport handle. Construct with [`init`](Self::init)
/// inside a tokio runtime; stop with [`teardown`](Self::teardown) or by
/// dropping it. Share one instance (for example behind an `Arc`) between
/// all consumers of the process.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    registry: DispatchRegistry,
    input: mpsc::UnboundedSender<Input>,
    policy: ReconnectPolicy,
}

impl ConnectionManager {
    /// Spawn the manager's actor task.
    ///
    /// The manager starts `Idle`; call [`connect`](Self::connect) to open
    /// the link. Lifecycle events arrive on the returned receiver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared::new(config.url.clone()));
        let registry = DispatchRegistry::new();

        let actor = Actor {
            shared: shared.clone(),
            registry: registry.clone(),
            lifecycle: Lifecycle::new(config.reconnect),
            keepalive_interval: config.keepalive_interval,
            input: input_tx.clone(),
            events: event_tx,
            transport: None,
            retry_timer: None,
            keepalive: None,
        };
        tokio::spawn(actor.run(input_rx));

        let manager = Self {
            shared,
            registry,
            input: input_tx,
            policy: config.reconnect,
        };
        (manager, event_rx)
    }

    /// Open the link. No-op while connecting or open.
    ///
    /// From any other state this is a manual reconnect: the retry budget is
    /// restored and a pending retry timer is discarded.
    pub fn connect(&self) {
        self.post(Input::Connect);
    }

    /// Point the manager at `url`, then [`connect`](Self::connect).
    pub fn connect_to(&self, url: impl Into<String>) {
        self.shared.set_url(url.into());
        self.connect();
    }

    /// Close the link with a normal-closure frame and stop reconnecting.
    ///
    /// Safe to call in any state and any number of times.
    pub fn disconnect(&self) {
        self.release_writer();
        self.post(Input::Disconnect);
    }

    /// Disconnect and stop the actor task. Further calls are no-ops.
    pub fn teardown(&self) {
        self.release_writer();
        self.post(Input::Shutdown);
    }

    /// Encode and write `message` if the link is open.
    ///
    /// Never queues: returns `false` (and logs) when the link is not open.
    pub fn send(&self, message: &WireMessage) -> bool {
        self.shared.send(message)
    }

    /// Register a handler for decoded inbound messages.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        self.registry.subscribe_fn(handler)
    }

    /// The subscriber set fed by this connection.
    pub fn registry(&self) -> &DispatchRegistry {
        &self.registry
    }

    pub fn state(&self) -> LinkState {
        self.shared.link().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn url(&self) -> String {
        self.shared.url()
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.snapshot()
    }

    fn release_writer(&self) {
        self.shared.release_writer();
    }

    fn post(&self, input: Input) {
        if self.input.send(input).is_err() {
            log::debug!("Connection manager already torn down");
        }
    }
}

impl MessageSink for ConnectionManager {
    fn send_message(&self, message: &WireMessage) -> bool {
        self.send(message)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// The transport handle currently owned by the actor.
struct ActiveTransport {
    generation: Generation,
    outbound: mpsc::UnboundedSender<Outbound>,
}

struct Actor {
    shared: Arc<Shared>,
    registry: DispatchRegistry,
    lifecycle: Lifecycle,
    keepalive_interval: Duration,
    input: mpsc::UnboundedSender<Input>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    transport: Option<ActiveTransport>,
    retry_timer: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
}

impl Actor {
    async fn run(mut self, mut input: mpsc::UnboundedReceiver<Input>) {
        while let Some(next) = input.recv().await {
            match next {
                Input::Connect => self.connect(),
                Input::Disconnect => self.disconnect(),
                Input::Shutdown => {
                    self.disconnect();
                    break;
                }
                Input::Opened(generation) => self.on_open(generation),
                Input::Frame(generation, text) => self.on_frame(generation, &text),
                Input::Closed(generation) => self.on_closed(generation),
                Input::RetryDue(generation) => self.on_retry_due(generation),
            }
        }
        log::debug!("Connection manager stopped");
    }

    fn connect(&mut self) {
        match self.lifecycle.connect() {
            Some(generation) => {
                self.cancel_retry();
                self.open_transport(generation);
            }
            None => log::debug!(
                "connect() ignored: already {}",
                self.lifecycle.state().label()
            ),
        }
    }

    fn disconnect(&mut self) {
        let was_active = self.lifecycle.disconnect();
        self.cancel_retry();
        self.close_transport();
        self.shared.set_link(self.lifecycle.state(), None);

        if was_active {
            AtomicConnectionStats::bump(&self.shared.stats.closes);
            log::info!("Disconnected from {}", self.shared.url());
            self.emit(ConnectionEvent::Closed);
        }
    }

    fn open_transport(&mut self, generation: Generation) {
        self.close_transport();

        let url = self.shared.url();
        log::info!(
            "Connecting to {url} (generation {generation}, retry {}/{})",
            self.lifecycle.attempts(),
            self.lifecycle.policy().max_attempts
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.shared.set_link(LinkState::Connecting, None);
        tokio::spawn(run_transport(url, generation, outbound_rx, self.input.clone()));
        self.transport = Some(ActiveTransport {
            generation,
            outbound: outbound_tx,
        });
    }

    /// Drop the current handle, asking it to close gracefully.
    fn close_transport(&mut self) {
        self.stop_keepalive();
        if let Some(active) = self.transport.take() {
            log::debug!("Closing transport (generation {})", active.generation);
            let _ = active.outbound.send(Outbound::Close);
        }
    }

    fn on_open(&mut self, generation: Generation) {
        if !self.lifecycle.on_open(generation) {
            log::trace!("Ignoring stale open (generation {generation})");
            return;
        }
        let Some(outbound) = self.transport.as_ref().map(|active| active.outbound.clone()) else {
            return;
        };

        self.cancel_retry();
        if !self.shared.open_link(outbound) {
            // disconnect() already returned; its Disconnect input is still queued.
            log::debug!("Not publishing open link (generation {generation}): closing");
            return;
        }
        AtomicConnectionStats::bump(&self.shared.stats.opens);
        log::info!("Connected to {}", self.shared.url());

        self.start_keepalive();
        self.emit(ConnectionEvent::Opened);
    }

    fn on_frame(&mut self, generation: Generation, text: &str) {
        if !self.lifecycle.is_current(generation) || self.lifecycle.state() != LinkState::Open {
            log::trace!("Ignoring stale frame (generation {generation})");
            return;
        }
        AtomicConnectionStats::bump(&self.shared.stats.frames_received);

        match WireMessage::decode(text) {
            Ok(message) => {
                let delivered = self.registry.dispatch(&message);
                log::trace!("Dispatched {} to {delivered} subscribers", message.kind());
            }
            Err(e) => {
                AtomicConnectionStats::bump(&self.shared.stats.frames_dropped);
                log::warn!("Dropping inbound frame: {e}");
            }
        }
    }

    fn on_closed(&mut self, generation: Generation) {
        let decision = self.lifecycle.on_close(generation);
        if decision == CloseDecision::Ignored {
            log::trace!("Ignoring stale close (generation {generation})");
            return;
        }

        self.transport = None;
        self.stop_keepalive();
        self.shared.set_link(LinkState::Closed, None);
        AtomicConnectionStats::bump(&self.shared.stats.closes);
        log::info!("Connection to {} closed", self.shared.url());
        self.emit(ConnectionEvent::Closed);

        match decision {
            CloseDecision::Retry {
                attempt,
                delay,
                generation,
            } => {
                log::info!(
                    "Reconnecting in {delay:?} (attempt {}/{})",
                    attempt + 1,
                    self.lifecycle.policy().max_attempts
                );
                self.schedule_retry(delay, generation);
                self.emit(ConnectionEvent::ReconnectScheduled { attempt, delay });
            }
            CloseDecision::Exhausted => {
                log::error!(
                    "Max reconnection attempts ({}) reached; giving up until connect() is called",
                    self.lifecycle.policy().max_attempts
                );
                self.emit(ConnectionEvent::ReconnectExhausted);
            }
            CloseDecision::Stop | CloseDecision::Ignored => {}
        }
    }

    fn on_retry_due(&mut self, generation: Generation) {
        self.retry_timer = None;
        match self.lifecycle.retry(generation) {
            Some(next) => {
                AtomicConnectionStats::bump(&self.shared.stats.reconnect_attempts);
                self.open_transport(next);
            }
            None => log::trace!("Ignoring stale retry timer (generation {generation})"),
        }
    }

    fn schedule_retry(&mut self, delay: Duration, generation: Generation) {
        self.cancel_retry();
        let input = self.input.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = input.send(Input::RetryDue(generation));
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    fn start_keepalive(&mut self) {
        self.stop_keepalive();
        let shared = self.shared.clone();
        let period = self.keepalive_interval;
        self.keepalive = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !shared.send(&WireMessage::Ping) {
                    log::debug!("Keep-alive ping not sent");
                }
            }
        }));
    }

    fn stop_keepalive(&mut self) {
        if let Some(task) = self.keepalive.take() {
            task.abort();
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for Actor {
    fn drop(&mut self) {
        self.cancel_retry();
        self.stop_keepalive();
    }
}

/// One transport attempt: connect, then pump frames both ways until either
/// side closes. Always reports `Closed` for its generation on exit.
async fn run_transport(
    url: String,
    generation: Generation,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    input: mpsc::UnboundedSender<Input>,
) {
    let connected = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
        _ = outbound.recv() => {
            log::debug!("Connection attempt {generation} cancelled");
            let _ = input.send(Input::Closed(generation));
            return;
        }
    };

    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            log::warn!("Connection to {url} failed: {e}");
            let _ = input.send(Input::Closed(generation));
            return;
        }
    };

    let (mut writer, mut reader) = ws_stream.split();
    if input.send(Input::Opened(generation)).is_err() {
        return;
    }

    loop {
        tokio::select! {
            request = outbound.recv() => match request {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = writer.send(Message::Text(text.into())).await {
                        log::warn!("WebSocket write failed: {e}");
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    let _ = writer.send(Message::Close(Some(frame))).await;
                    break;
                }
            },
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if input.send(Input::Frame(generation, text.as_str().to_owned())).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    log::warn!("Dropping {}-byte binary frame", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    log::debug!("Server closed the connection: {frame:?}");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("WebSocket error: {e}");
                    break;
                }
                None => break,
            },
        }
    }

    let _ = input.send(Input::Closed(generation));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> ClientConfig {
        ClientConfig {
            // Reserved port on localhost: connection refused immediately.
            url: "ws://127.0.0.1:1".to_string(),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                max_attempts: 2,
            },
            keepalive_interval: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (manager, _events) = ConnectionManager::init(ClientConfig::with_url("ws://127.0.0.1:9"));
        assert_eq!(manager.state(), LinkState::Idle);
        assert!(!manager.is_connected());
        assert_eq!(manager.url(), "ws://127.0.0.1:9");
        assert_eq!(manager.stats(), ConnectionStats::default());
    }

    #[tokio::test]
    async fn test_send_while_idle_returns_false() {
        let (manager, _events) = ConnectionManager::init(ClientConfig::default());
        assert!(!manager.send(&WireMessage::Ping));
        assert!(!manager.send_message(&WireMessage::Ping));
        assert_eq!(manager.stats().frames_sent, 0);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_safe() {
        let (manager, _events) = ConnectionManager::init(ClientConfig::default());
        manager.disconnect();
        manager.disconnect();
        manager.teardown();
        manager.teardown();
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_exhaustion_against_unreachable_server() {
        let (manager, mut events) = ConnectionManager::init(unreachable_config());
        manager.connect();

        let mut scheduled = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for events")
                .expect("event channel closed");
            match event {
                ConnectionEvent::ReconnectScheduled { attempt, delay } => scheduled.push((attempt, delay)),
                ConnectionEvent::ReconnectExhausted => break,
                ConnectionEvent::Closed => {}
                ConnectionEvent::Opened => panic!("unexpected open"),
            }
        }

        assert_eq!(
            scheduled,
            vec![(0, Duration::from_millis(5)), (1, Duration::from_millis(10))]
        );
        assert_eq!(manager.state(), LinkState::Closed);
        assert_eq!(manager.stats().reconnect_attempts, 2);

        // Nothing else happens on its own.
        let quiet = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
        assert!(quiet.is_err(), "no events expected after exhaustion, got {quiet:?}");
    }

    #[tokio::test]
    async fn test_malformed_url_goes_through_retry_path() {
        let mut config = unreachable_config();
        config.url = "not a url".to_string();
        config.reconnect.max_attempts = 1;
        let (manager, mut events) = ConnectionManager::init(config);
        manager.connect();

        let mut seen = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
            let done = event == ConnectionEvent::ReconnectExhausted;
            seen.push(event);
            if done {
                break;
            }
        }
        assert_eq!(
            seen.iter().filter(|e| **e == ConnectionEvent::ReconnectExhausted).count(),
            1
        );
        assert!(seen.contains(&ConnectionEvent::Closed));
    }

    #[tokio::test]
    async fn test_disconnect_during_backoff_cancels_retry() {
        let mut config = unreachable_config();
        config.reconnect.base_delay = Duration::from_millis(200);
        config.reconnect.max_delay = Duration::from_millis(200);
        let (manager, mut events) = ConnectionManager::init(config);
        manager.connect();

        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, ConnectionEvent::ReconnectScheduled { .. }) {
                break;
            }
        }
        manager.disconnect();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(manager.stats().reconnect_attempts, 0);
        assert_eq!(manager.state(), LinkState::Closed);
    }

    #[test]
    fn test_open_after_pending_disconnect_keeps_writer_released() {
        let shared = Shared::new("ws://127.0.0.1:9".to_string());
        let (writer, mut frames) = mpsc::unbounded_channel();
        shared.set_link(LinkState::Connecting, None);

        // disconnect() ran before the actor handled the queued open.
        shared.release_writer();
        assert!(!shared.open_link(writer.clone()));
        assert_eq!(shared.link().state, LinkState::Closing);
        assert!(!shared.send(&WireMessage::Ping));
        assert!(frames.try_recv().is_err());

        // Without a pending disconnect the writer is published.
        shared.set_link(LinkState::Connecting, None);
        assert!(shared.open_link(writer));
        assert!(shared.send(&WireMessage::Ping));
        assert!(matches!(frames.try_recv(), Ok(Outbound::Frame(text)) if text == r#"{"type":"ping"}"#));
    }

    #[tokio::test]
    async fn test_subscribe_through_manager() {
        let (manager, _events) = ConnectionManager::init(ClientConfig::default());
        let sub = manager.subscribe(|_| {});
        assert_eq!(manager.registry().subscriber_count(), 1);
        drop(sub);
        assert!(manager.registry().is_empty());
    }
}
