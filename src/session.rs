//! Session builder and runtime loop.
//!
//! The [`SessionBuilder`] configures a room session and registers listeners.
//! The [`Session`] drives the lifecycle:
//! 1. Open the transport (`Connecting`)
//! 2. Send the auth frame and check the first reply (`Authenticating`)
//! 3. Run the heartbeat task and the receive loop concurrently (`Live`)
//! 4. Tear down on `exit()`, end of stream or transport failure (`Closing` → `Closed`)
//!
//! # Example
//!
//! ```ignore
//! use danmaku_client::{DecodedMessage, EventKind, RoomInfoClient, Session, WebSocketConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = RoomInfoClient::new().connection_params(23219374).await?;
//!     let session = Session::builder(23219374)
//!         .on(EventKind::Danmaku, |msg: &DecodedMessage| {
//!             println!("{:?}", msg);
//!             Ok(())
//!         })
//!         .start(&WebSocketConnector::new(), &params)
//!         .await?;
//!
//!     let end = session.wait_for_shutdown().await;
//!     println!("session ended: {:?}", end);
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::control::{
    build_auth_frame, check_auth_reply, AuthBody, ConnectionParams, DEFAULT_PLATFORM,
    DEFAULT_PROTOVER,
};
use crate::error::{DanmakuError, Result};
use crate::handler::{EventDispatcher, EventKind, HandlerResult, Listener};
use crate::message::DecodedMessage;
use crate::protocol::{FrameDecoder, Operation};
use crate::transport::{Connector, Transport};
use crate::writer::FrameWriter;

/// Default heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on the wait for the auth reply.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Placeholder body the relay expects on heartbeat frames.
pub const DEFAULT_HEARTBEAT_BODY: &str = "[object Object]";

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not started.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Auth frame sent, waiting for the first reply.
    Authenticating,
    /// Heartbeat and receive loop running.
    Live,
    /// Tearing down.
    Closing,
    /// Transport closed; terminal.
    Closed,
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// `exit()` was called.
    Exited,
    /// The relay ended the stream.
    StreamEnded,
    /// Sending or receiving failed.
    TransportFailed(String),
    /// The session never reached `Live` (open, auth or timeout failure).
    StartFailed(String),
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Room to join.
    pub room_id: u64,
    /// User id; 0 joins anonymously.
    pub uid: u64,
    /// Heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// Bound on the wait for the first reply after the auth frame.
    pub auth_timeout: Duration,
    /// Heartbeat frame body.
    pub heartbeat_body: String,
    /// Body protocol requested in the auth frame.
    pub protover: u16,
    /// Platform tag sent in the auth frame.
    pub platform: String,
}

impl SessionConfig {
    /// Defaults for `room_id`.
    pub fn new(room_id: u64) -> Self {
        Self {
            room_id,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room_id: 0,
            uid: 0,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            heartbeat_body: DEFAULT_HEARTBEAT_BODY.to_string(),
            protover: DEFAULT_PROTOVER,
            platform: DEFAULT_PLATFORM.to_string(),
        }
    }
}

/// Builder for configuring and creating a [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    listeners: Vec<(EventKind, Listener)>,
}

impl SessionBuilder {
    /// Builder for `room_id` with default settings.
    pub fn new(room_id: u64) -> Self {
        Self::with_config(SessionConfig::new(room_id))
    }

    /// Builder starting from an explicit configuration.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            config,
            listeners: Vec::new(),
        }
    }

    /// Set the user id (default 0, anonymous).
    pub fn uid(mut self, uid: u64) -> Self {
        self.config.uid = uid;
        self
    }

    /// Set the heartbeat cadence.
    ///
    /// Default: 30 seconds
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the auth reply timeout.
    ///
    /// Default: 10 seconds
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout = timeout;
        self
    }

    /// Set the heartbeat frame body.
    pub fn heartbeat_body(mut self, body: impl Into<String>) -> Self {
        self.config.heartbeat_body = body.into();
        self
    }

    /// Set the body protocol requested in the auth frame.
    pub fn protover(mut self, protover: u16) -> Self {
        self.config.protover = protover;
        self
    }

    /// Set the platform tag sent in the auth frame.
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.config.platform = platform.into();
        self
    }

    /// Register a listener handle for `kind`.
    pub fn listener(mut self, kind: EventKind, listener: Listener) -> Self {
        self.listeners.push((kind, listener));
        self
    }

    /// Register a closure for `kind`.
    pub fn on<F>(self, kind: EventKind, f: F) -> Self
    where
        F: Fn(&DecodedMessage) -> HandlerResult + Send + Sync + 'static,
    {
        self.listener(kind, crate::handler::listener(f))
    }

    /// Build an `Idle` session.
    ///
    /// # Errors
    ///
    /// `DuplicateListener` if the same listener handle was registered twice
    /// for one kind.
    pub fn build(self) -> Result<Session> {
        let dispatcher = EventDispatcher::new();
        for (kind, listener) in self.listeners {
            dispatcher.add_listener(kind, listener)?;
        }
        Ok(Session::from_parts(self.config, Arc::new(dispatcher)))
    }

    /// Build the session and start it.
    pub async fn start(
        self,
        connector: &dyn Connector,
        params: &ConnectionParams,
    ) -> Result<Session> {
        let session = self.build()?;
        session.start(connector, params).await?;
        Ok(session)
    }
}

/// A room session.
///
/// Cheaply cloneable; all clones control the same connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    dispatcher: Arc<EventDispatcher>,
    state: Mutex<SessionState>,
    writer: Mutex<Option<FrameWriter>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    end: watch::Sender<Option<SessionEnd>>,
}

impl Session {
    /// Create a session builder for `room_id`.
    pub fn builder(room_id: u64) -> SessionBuilder {
        SessionBuilder::new(room_id)
    }

    /// `Idle` session with no listeners.
    pub fn new(config: SessionConfig) -> Self {
        Self::from_parts(config, Arc::new(EventDispatcher::new()))
    }

    fn from_parts(config: SessionConfig, dispatcher: Arc<EventDispatcher>) -> Self {
        let (end, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                state: Mutex::new(SessionState::Idle),
                writer: Mutex::new(None),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                end,
            }),
        }
    }

    /// Configuration this session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Listener registry scoped to this session.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }

    /// Register `listener` for `kind`. Allowed in any state.
    pub fn add_listener(&self, kind: EventKind, listener: Listener) -> Result<()> {
        self.inner.dispatcher.add_listener(kind, listener)
    }

    /// Unregister `listener` from `kind`.
    pub fn remove_listener(&self, kind: &EventKind, listener: &Listener) -> Result<()> {
        self.inner.dispatcher.remove_listener(kind, listener)
    }

    /// Connect, authenticate and go `Live`.
    ///
    /// On any failure the transport is closed, the session ends up `Closed`
    /// and the error is returned.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Idle`, or if `exit` ran mid-start; transport
    /// errors from `open`;
    /// `AuthenticationRejected`, `AuthenticationTimeout` or `ConnectionClosed`
    /// from the handshake.
    pub async fn start(&self, connector: &dyn Connector, params: &ConnectionParams) -> Result<()> {
        self.transition(SessionState::Idle, SessionState::Connecting)?;

        let transport = match connector.open(&params.url).await {
            Ok(transport) => transport,
            Err(e) => {
                self.teardown(SessionEnd::StartFailed(e.to_string())).await;
                return Err(e);
            }
        };
        // exit() may have run while the transport was opening.
        if let Err(e) = self.transition(SessionState::Connecting, SessionState::Authenticating) {
            close_transport(&transport).await;
            return Err(e);
        }
        let writer = FrameWriter::new(transport.clone());
        *self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(writer.clone());

        if let Err(e) = self.authenticate(&writer, &transport, &params.token).await {
            tracing::error!(room_id = self.inner.config.room_id, "Authentication failed: {}", e);
            self.teardown(SessionEnd::StartFailed(e.to_string())).await;
            close_transport(&transport).await;
            return Err(e);
        }

        // Or while the handshake was in flight.
        if let Err(e) = self.transition(SessionState::Authenticating, SessionState::Live) {
            close_transport(&transport).await;
            return Err(e);
        }

        let heartbeat = tokio::spawn(Self::heartbeat_task(
            self.clone(),
            writer,
            self.inner.cancel.child_token(),
        ));
        let receiver = tokio::spawn(Self::receive_task(
            self.clone(),
            transport,
            self.inner.cancel.child_token(),
        ));
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([heartbeat, receiver]);

        Ok(())
    }

    /// Start, then wait for the terminal event. Always tears down.
    pub async fn run(&self, connector: &dyn Connector, params: &ConnectionParams) -> Result<SessionEnd> {
        self.start(connector, params).await?;
        let end = self.wait_for_shutdown().await;
        self.exit().await?;
        Ok(end)
    }

    async fn authenticate(
        &self,
        writer: &FrameWriter,
        transport: &Arc<dyn Transport>,
        token: &str,
    ) -> Result<()> {
        let config = &self.inner.config;
        let mut body = AuthBody::new(config.uid, config.room_id, token);
        body.protover = config.protover;
        body.platform = config.platform.clone();

        if self.inner.cancel.is_cancelled() {
            return Err(DanmakuError::ConnectionClosed);
        }
        writer.send_raw(build_auth_frame(&body)?).await?;

        let reply = tokio::select! {
            () = self.inner.cancel.cancelled() => return Err(DanmakuError::ConnectionClosed),
            reply = time::timeout(config.auth_timeout, transport.recv()) => reply,
        };
        match reply {
            Err(_) => Err(DanmakuError::AuthenticationTimeout),
            Ok(Err(e)) => Err(e),
            Ok(Ok(None)) => Err(DanmakuError::ConnectionClosed),
            Ok(Ok(Some(buf))) => check_auth_reply(&buf),
        }
    }

    /// Send `body` as a frame with operation `op`.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless `Live`.
    pub async fn send(&self, op: Operation, body: &[u8]) -> Result<()> {
        self.live_writer()?.send_frame(op, body).await
    }

    /// Send `value` as a JSON-bodied frame with operation `op`.
    pub async fn send_json<T: Serialize>(&self, op: Operation, value: &T) -> Result<()> {
        self.live_writer()?.send_json(op, value).await
    }

    fn live_writer(&self) -> Result<FrameWriter> {
        let state = self.state();
        if state != SessionState::Live {
            return Err(DanmakuError::InvalidState {
                expected: SessionState::Live,
                actual: state,
            });
        }
        self.inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DanmakuError::ConnectionClosed)
    }

    /// Stop the session: cancel the heartbeat, close the transport and wait
    /// for the background tasks. Idempotent.
    pub async fn exit(&self) -> Result<()> {
        self.teardown(SessionEnd::Exited).await;

        let tasks: Vec<_> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Session task failed: {}", e);
            }
        }
        Ok(())
    }

    /// Wait until the session stops and return why.
    pub async fn wait_for_shutdown(&self) -> SessionEnd {
        let mut rx = self.inner.end.subscribe();
        let end = match rx.wait_for(Option::is_some).await {
            Ok(end) => end.clone().unwrap_or(SessionEnd::Exited),
            Err(_) => SessionEnd::Exited,
        };
        end
    }

    /// Terminal event, if the session has stopped.
    pub fn end_reason(&self) -> Option<SessionEnd> {
        self.inner.end.borrow().clone()
    }

    async fn heartbeat_task(session: Session, writer: FrameWriter, cancel: CancellationToken) {
        let config = &session.inner.config;
        let body = Bytes::from(config.heartbeat_body.clone());
        match run_heartbeat(writer, config.heartbeat_interval, body, cancel).await {
            HeartbeatResult::Cancelled => {}
            HeartbeatResult::SendFailed(reason) => {
                tracing::error!("Heartbeat send failed: {}", reason);
                session.teardown(SessionEnd::TransportFailed(reason)).await;
            }
        }
    }

    async fn receive_task(session: Session, transport: Arc<dyn Transport>, cancel: CancellationToken) {
        let end = receive_loop(transport.as_ref(), &session.inner.dispatcher, &cancel).await;
        match &end {
            SessionEnd::TransportFailed(reason) => tracing::error!("Receive loop failed: {}", reason),
            other => tracing::debug!(?other, "Receive loop stopped"),
        }
        session.teardown(end).await;
    }

    /// First caller moves the session to `Closing`, closes the transport and
    /// publishes `end`; later callers return immediately.
    async fn teardown(&self, end: SessionEnd) {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if matches!(*state, SessionState::Closing | SessionState::Closed) {
                return;
            }
            let from = *state;
            tracing::info!(room_id = self.inner.config.room_id, ?from, "Session closing");
            *state = SessionState::Closing;
        }

        self.inner.cancel.cancel();

        let writer = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(writer) = writer {
            if let Err(e) = writer.transport().close().await {
                tracing::warn!("Transport close failed: {}", e);
            }
        }

        self.set_state(SessionState::Closed);
        self.inner.end.send_replace(Some(end));
    }

    fn transition(&self, expected: SessionState, next: SessionState) -> Result<()> {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *state != expected {
            return Err(DanmakuError::InvalidState {
                expected,
                actual: *state,
            });
        }
        let from = *state;
        tracing::info!(room_id = self.inner.config.room_id, ?from, to = ?next, "Session state");
        *state = next;
        Ok(())
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        tracing::info!(room_id = self.inner.config.room_id, ?from, to = ?next, "Session state");
        *state = next;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("room_id", &self.inner.config.room_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Close a transport the session no longer owns.
async fn close_transport(transport: &Arc<dyn Transport>) {
    if let Err(e) = transport.close().await {
        tracing::debug!("Transport close failed: {}", e);
    }
}

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Cancelled by teardown.
    Cancelled,
    /// A heartbeat frame could not be sent.
    SendFailed(String),
}

/// Send a heartbeat frame every `interval`, first one `interval` after start.
///
/// Runs independently of inbound traffic until `cancel` fires or a send fails.
pub async fn run_heartbeat(
    writer: FrameWriter,
    interval: Duration,
    body: Bytes,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::debug!("Sending heartbeat");
                if let Err(e) = writer.send_frame(Operation::Heartbeat, &body).await {
                    return HeartbeatResult::SendFailed(e.to_string());
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

/// Read buffers until end of stream, failure or cancellation, dispatching
/// every decoded message.
///
/// An undecodable buffer is logged and skipped.
pub async fn receive_loop(
    transport: &dyn Transport,
    dispatcher: &EventDispatcher,
    cancel: &CancellationToken,
) -> SessionEnd {
    let decoder = FrameDecoder::new();

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return SessionEnd::Exited,
            next = transport.recv() => next,
        };

        let buf = match next {
            Ok(Some(buf)) => buf,
            Ok(None) => return SessionEnd::StreamEnded,
            Err(e) => return SessionEnd::TransportFailed(e.to_string()),
        };

        match decoder.decode(&buf) {
            Ok(packets) => {
                for packet in packets {
                    dispatcher.dispatch_message(&DecodedMessage::from(packet));
                }
            }
            Err(e) => tracing::warn!(len = buf.len(), "Dropping undecodable buffer: {}", e),
        }
    }
}
